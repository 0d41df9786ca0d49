use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::{AppError, Result};
use crate::models::{ChatId, Conversation, Message, Review};
use crate::storage::key_value::KeyValueStore;

const STATE_KEY: &str = "chat_state";
const USER_ID_KEY: &str = "user_id";
const REVIEWS_KEY: &str = "reviews";

/// Everything the conversation store persists, in the on-disk layout:
/// `{"conversations": [...], "messages": [[chat_id, [message, ...]], ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub messages: Vec<(ChatId, Vec<Message>)>,
}

/// Typed access to the client's durable keys.
#[derive(Clone)]
pub struct StateRepository {
    store: Arc<dyn KeyValueStore>,
    // Serializes snapshot writes across every clone of the repository.
    save_lock: Arc<Mutex<()>>,
}

impl StateRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Reads the snapshot blob. Absence is `Ok(None)`; unparsable JSON is
    /// `MalformedLocalState` and left for the caller to absorb.
    pub async fn load_snapshot(&self) -> Result<Option<StateSnapshot>> {
        let Some(raw) = self.store.get(STATE_KEY).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(AppError::MalformedLocalState)
    }

    pub async fn save_snapshot(&self, snapshot: &StateSnapshot) -> Result<()> {
        let snapshot = snapshot.clone();
        self.save_latest(move || snapshot).await
    }

    /// Captures the snapshot only once the write slot is held, so the last
    /// write to land is always the newest capture.
    pub async fn save_latest<F>(&self, capture: F) -> Result<()>
    where
        F: FnOnce() -> StateSnapshot + Send,
    {
        let _guard = self.save_lock.lock().await;
        let snapshot = capture();
        let raw = serde_json::to_string(&snapshot).map_err(AppError::MalformedLocalState)?;
        self.store.set(STATE_KEY, &raw).await?;
        debug!(
            conversations = snapshot.conversations.len(),
            "Chat state snapshot written"
        );
        Ok(())
    }

    /// Per-install user id, generated on first use and kept from then on.
    pub async fn user_id(&self) -> Result<String> {
        if let Some(existing) = self.store.get(USER_ID_KEY).await? {
            let existing = existing.trim();
            if !existing.is_empty() {
                return Ok(existing.to_string());
            }
        }
        let user_id = format!("user_{}", uuid::Uuid::new_v4().simple());
        self.store.set(USER_ID_KEY, &user_id).await?;
        info!("Generated new user id {user_id}");
        Ok(user_id)
    }

    pub async fn load_reviews(&self) -> Result<Vec<Review>> {
        match self.store.get(REVIEWS_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(AppError::MalformedLocalState),
            None => Ok(Vec::new()),
        }
    }

    pub async fn save_reviews(&self, reviews: &[Review]) -> Result<()> {
        let raw = serde_json::to_string(reviews).map_err(AppError::MalformedLocalState)?;
        self.store.set(REVIEWS_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;
    use crate::models::{AttachmentRef, RemoteId};
    use crate::storage::key_value::{FileStore, MemoryStore};

    fn repo() -> (Arc<MemoryStore>, StateRepository) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), StateRepository::new(store))
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_none() {
        let (_, repo) = repo();
        assert!(repo.load_snapshot().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_snapshot_is_reported() {
        let (store, repo) = repo();
        store.set(STATE_KEY, "{not json").await.unwrap();
        let err = repo.load_snapshot().await.unwrap_err();
        assert!(matches!(err, AppError::MalformedLocalState(_)));
    }

    #[tokio::test]
    async fn test_snapshot_layout_is_pairs() {
        let (store, repo) = repo();
        let snapshot = StateSnapshot {
            conversations: vec![Conversation::new(42, "hello")],
            messages: vec![(
                RemoteId::Number(42),
                vec![Message::pending_user("hi", vec![AttachmentRef::new("a.txt", 10, "text/plain")])],
            )],
        };
        repo.save_snapshot(&snapshot).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&store.get(STATE_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(raw["conversations"][0]["chat_id"], 42);
        assert_eq!(raw["messages"][0][0], 42);
        assert_eq!(raw["messages"][0][1][0]["text"], "hi");

        assert_eq!(repo.load_snapshot().await.unwrap(), Some(snapshot));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_saves_keep_newest_capture() {
        let dir = tempfile::tempdir().unwrap();
        let repo = StateRepository::new(Arc::new(FileStore::new(dir.path())));
        let captures = Arc::new(AtomicI64::new(0));

        let savers: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let captures = captures.clone();
                tokio::spawn(async move {
                    repo.save_latest(move || {
                        let n = captures.fetch_add(1, Ordering::SeqCst) + 1;
                        StateSnapshot {
                            conversations: vec![Conversation::new(n, "chat")],
                            messages: Vec::new(),
                        }
                    })
                    .await
                })
            })
            .collect();
        for saver in savers {
            saver.await.unwrap().unwrap();
        }

        let stored = repo.load_snapshot().await.unwrap().unwrap();
        assert_eq!(stored.conversations[0].id, RemoteId::Number(8));
    }

    #[tokio::test]
    async fn test_user_id_is_stable() {
        let (store, repo) = repo();
        let first = repo.user_id().await.unwrap();
        let second = repo.user_id().await.unwrap();
        assert!(first.starts_with("user_"));
        assert_eq!(first, second);
        assert_eq!(store.write_count(), 1);
    }
}
