use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::errors::{AppError, Result};
use crate::models::{AttachmentRef, ChatId, Conversation, Message, Transcript, DEFAULT_TITLE};
use crate::remote::ChatRemote;
use crate::storage::{StateRepository, StateSnapshot};

/// What a call to [`ConversationStore::send_message`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank text and no attachments; nothing happened.
    Ignored,
    /// Another send was still in flight; nothing happened.
    Rejected,
    /// The service answered and the transcript was reconciled.
    Delivered,
    /// The service failed; an error reply was appended to the transcript.
    Failed,
}

#[derive(Default)]
struct StoreState {
    conversations: Vec<Conversation>,
    messages: HashMap<ChatId, Vec<Message>>,
    active: Option<ChatId>,
    composing: bool,
    /// Ticket of the send currently allowed to drive the composing flag.
    in_flight: Option<u64>,
    last_ticket: u64,
    pending_attachments: Vec<AttachmentRef>,
}

impl StoreState {
    fn owns(&self, ticket: u64) -> bool {
        self.in_flight == Some(ticket)
    }

    fn claim(&mut self) -> Option<u64> {
        if self.in_flight.is_some() {
            return None;
        }
        self.last_ticket += 1;
        self.in_flight = Some(self.last_ticket);
        Some(self.last_ticket)
    }

    fn contains(&self, id: &ChatId) -> bool {
        self.conversations.iter().any(|c| &c.id == id)
    }

    fn upsert_front(&mut self, conversation: Conversation) {
        if !self.contains(&conversation.id) {
            self.conversations.insert(0, conversation);
        }
    }

    fn push_message(&mut self, chat_id: &ChatId, message: Message) {
        self.messages.entry(chat_id.clone()).or_default().push(message);
    }

    fn replace_messages(&mut self, chat_id: &ChatId, canonical: Vec<Message>) {
        let mut seen = HashSet::new();
        let deduped = canonical
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .collect();
        self.messages.insert(chat_id.clone(), deduped);
    }

    /// Takes over the title the service reports. Blank titles are ignored.
    fn retitle(&mut self, chat_id: &ChatId, title: Option<String>) {
        let Some(title) = title.filter(|t| !t.trim().is_empty()) else {
            return;
        };
        if let Some(conversation) = self.conversations.iter_mut().find(|c| &c.id == chat_id) {
            if conversation.title != title {
                debug!("Conversation {chat_id} renamed to {title:?}");
                conversation.title = title;
            }
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        let mut messages: Vec<(ChatId, Vec<Message>)> = self
            .conversations
            .iter()
            .filter_map(|c| self.messages.get(&c.id).map(|m| (c.id.clone(), m.clone())))
            .collect();
        let mut orphans: Vec<_> = self
            .messages
            .iter()
            .filter(|(id, _)| !self.contains(id))
            .map(|(id, m)| (id.clone(), m.clone()))
            .collect();
        orphans.sort_by(|a, b| a.0.cmp(&b.0));
        messages.extend(orphans);
        StateSnapshot { conversations: self.conversations.clone(), messages }
    }
}

/// Authoritative in-memory view of conversations and their transcripts.
///
/// Sends are applied optimistically and reconciled against the chat service
/// afterwards. The handle is cheap to clone; all clones share one state.
/// The internal lock is never held across a remote call.
#[derive(Clone)]
pub struct ConversationStore {
    state: Arc<Mutex<StoreState>>,
    remote: Arc<dyn ChatRemote>,
    repository: StateRepository,
}

impl ConversationStore {
    pub fn new(remote: Arc<dyn ChatRemote>, repository: StateRepository) -> Self {
        Self { state: Arc::new(Mutex::new(StoreState::default())), remote, repository }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Read access ───────────────────────────────────────────────────────────

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state().conversations.clone()
    }

    pub fn active_id(&self) -> Option<ChatId> {
        self.state().active.clone()
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        let st = self.state();
        let active = st.active.as_ref()?;
        st.conversations.iter().find(|c| &c.id == active).cloned()
    }

    pub fn active_messages(&self) -> Vec<Message> {
        let st = self.state();
        st.active
            .as_ref()
            .and_then(|id| st.messages.get(id).cloned())
            .unwrap_or_default()
    }

    pub fn messages_for(&self, chat_id: &ChatId) -> Vec<Message> {
        self.state().messages.get(chat_id).cloned().unwrap_or_default()
    }

    /// True while the assistant reply for the current send is outstanding.
    pub fn is_composing(&self) -> bool {
        self.state().composing
    }

    pub fn is_sending(&self) -> bool {
        self.state().in_flight.is_some()
    }

    pub fn pending_attachments(&self) -> Vec<AttachmentRef> {
        self.state().pending_attachments.clone()
    }

    // ── Pending attachments ───────────────────────────────────────────────────

    /// Adds files to the pending selection, skipping any whose name and size
    /// match an already selected file. Returns how many were added.
    pub fn attach(&self, files: impl IntoIterator<Item = AttachmentRef>) -> usize {
        let mut st = self.state();
        let mut added = 0;
        for file in files {
            if st.pending_attachments.iter().any(|f| f.same_file(&file)) {
                debug!("Skipping duplicate attachment {}", file.name);
                continue;
            }
            st.pending_attachments.push(file);
            added += 1;
        }
        added
    }

    pub fn detach(&self, index: usize) -> Option<AttachmentRef> {
        let mut st = self.state();
        (index < st.pending_attachments.len()).then(|| st.pending_attachments.remove(index))
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    /// Creates a conversation on the service and makes it active.
    /// Only valid while no conversation is active.
    pub async fn start_conversation(&self, seed_text: &str) -> Result<Conversation> {
        if let Some(active) = self.active_id() {
            return Err(AppError::invalid(format!(
                "conversation {active} is already active"
            )));
        }
        self.create_conversation(seed_text, None).await
    }

    async fn create_conversation(&self, seed_text: &str, ticket: Option<u64>) -> Result<Conversation> {
        let title = match seed_text.trim() {
            "" => DEFAULT_TITLE,
            t => t,
        };
        let conversation = self.remote.create_chat(title).await.map_err(|e| {
            error!("Failed to create conversation: {e}");
            e
        })?;

        {
            let mut st = self.state();
            st.upsert_front(conversation.clone());
            // A reset while the create was in flight leaves the store in start mode.
            if ticket.map_or(true, |t| st.owns(t)) {
                st.active = Some(conversation.id.clone());
            }
        }
        info!("Started conversation {}", conversation.id);
        self.persist().await;
        Ok(conversation)
    }

    /// Sends `text` plus `attachments` in the active conversation, creating one
    /// first when none is active.
    ///
    /// The user message is visible before the service answers. A failed send
    /// keeps it and appends an assistant error reply instead; that case is
    /// `Ok(SendOutcome::Failed)`. `Err` only comes back when a needed
    /// conversation could not be created, in which case nothing was appended.
    pub async fn send_message(&self, text: &str, attachments: Vec<AttachmentRef>) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() && attachments.is_empty() {
            return Ok(SendOutcome::Ignored);
        }
        let Some(ticket) = self.state().claim() else {
            debug!("Send rejected: another send is in flight");
            return Ok(SendOutcome::Rejected);
        };
        self.run_send(ticket, text, attachments).await
    }

    /// Presentation entry point: sends `text` together with the pending
    /// attachment selection, which is cleared once the send is accepted.
    pub async fn submit(&self, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        let (ticket, attachments) = {
            let mut st = self.state();
            if text.is_empty() && st.pending_attachments.is_empty() {
                return Ok(SendOutcome::Ignored);
            }
            let Some(ticket) = st.claim() else {
                debug!("Submit rejected: another send is in flight");
                return Ok(SendOutcome::Rejected);
            };
            (ticket, std::mem::take(&mut st.pending_attachments))
        };
        self.run_send(ticket, text, attachments).await
    }

    async fn run_send(&self, ticket: u64, text: &str, attachments: Vec<AttachmentRef>) -> Result<SendOutcome> {
        let chat_id = match self.active_id() {
            Some(id) => id,
            None => match self.create_conversation(text, Some(ticket)).await {
                Ok(conversation) => conversation.id,
                Err(e) => {
                    self.release(ticket);
                    return Err(e);
                }
            },
        };

        {
            let mut st = self.state();
            st.push_message(&chat_id, Message::pending_user(text, attachments.clone()));
            if st.owns(ticket) {
                st.composing = true;
            }
        }

        let outcome = match self.remote.send_message(&chat_id, text, &attachments).await {
            Ok(reply) => {
                {
                    let mut st = self.state();
                    if st.owns(ticket) {
                        st.composing = false;
                    }
                    st.push_message(&chat_id, Message::assistant(reply.id, reply.content));
                }
                self.refresh_after_send(&chat_id).await;
                SendOutcome::Delivered
            }
            Err(e) => {
                warn!("Send to conversation {chat_id} failed: {e}");
                let mut st = self.state();
                if st.owns(ticket) {
                    st.composing = false;
                }
                st.push_message(&chat_id, Message::send_failure());
                SendOutcome::Failed
            }
        };

        self.persist().await;
        self.release(ticket);
        Ok(outcome)
    }

    /// Best effort: a non-empty canonical transcript replaces the local one.
    async fn refresh_after_send(&self, chat_id: &ChatId) {
        match self.remote.list_messages(chat_id).await {
            Ok(Transcript { title, messages }) => {
                let mut st = self.state();
                st.retitle(chat_id, title);
                if messages.is_empty() {
                    debug!("Service returned no messages for {chat_id}; keeping local transcript");
                } else {
                    st.replace_messages(chat_id, messages);
                }
            }
            Err(e) => warn!("Could not refresh conversation {chat_id}: {e}"),
        }
    }

    fn release(&self, ticket: u64) {
        let mut st = self.state();
        if st.owns(ticket) {
            st.in_flight = None;
            st.composing = false;
        }
    }

    /// Makes `chat_id` active and reloads its transcript from the service,
    /// keeping the cached transcript if the service cannot be reached.
    pub async fn select_conversation(&self, chat_id: &ChatId) -> Result<()> {
        {
            let mut st = self.state();
            if !st.contains(chat_id) {
                return Err(AppError::invalid(format!("unknown conversation {chat_id}")));
            }
            st.active = Some(chat_id.clone());
        }

        match self.remote.list_messages(chat_id).await {
            Ok(Transcript { title, messages }) => {
                {
                    let mut st = self.state();
                    st.retitle(chat_id, title);
                    st.replace_messages(chat_id, messages);
                }
                self.persist().await;
            }
            Err(e) => warn!("Showing cached messages for {chat_id}: {e}"),
        }
        Ok(())
    }

    /// Back to start mode. Conversations and transcripts are kept; a send
    /// still in flight finishes into its own conversation without touching
    /// the flags of whatever happens next.
    pub fn reset_to_start(&self) {
        let mut st = self.state();
        st.active = None;
        st.composing = false;
        st.in_flight = None;
        st.pending_attachments.clear();
        debug!("Store reset to start mode");
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    /// Imports the persisted state, then merges in the service's conversation
    /// list. Unreadable local state counts as empty; an unreachable service
    /// leaves the local list as it is.
    pub async fn load_from_persistence(&self) -> Result<()> {
        let snapshot = match self.repository.load_snapshot().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => StateSnapshot::default(),
            Err(e) => {
                warn!("Ignoring unreadable chat state: {e}");
                StateSnapshot::default()
            }
        };

        {
            let mut st = self.state();
            st.conversations.clear();
            for conversation in snapshot.conversations {
                if !st.contains(&conversation.id) {
                    st.conversations.push(conversation);
                }
            }
            st.messages = snapshot.messages.into_iter().collect();
            if st.active.as_ref().is_some_and(|id| !st.contains(id)) {
                st.active = None;
            }
        }

        match self.remote.list_chats().await {
            Ok(remote_chats) => {
                {
                    let mut st = self.state();
                    let mut seen = HashSet::new();
                    let mut merged: Vec<Conversation> = remote_chats
                        .into_iter()
                        .filter(|c| seen.insert(c.id.clone()))
                        .collect();
                    let local_only: Vec<Conversation> = st
                        .conversations
                        .drain(..)
                        .filter(|c| !seen.contains(&c.id))
                        .collect();
                    merged.extend(local_only);
                    st.conversations = merged;
                    let StoreState { conversations, messages, .. } = &mut *st;
                    messages.retain(|id, _| conversations.iter().any(|c| &c.id == id));
                }
                self.persist().await;
            }
            Err(e) => warn!("Could not load conversation history from service: {e}"),
        }

        info!("Loaded {} conversations", self.state().conversations.len());
        Ok(())
    }

    /// Writes the full store to the persistence gateway. The state is
    /// captured once the repository's write slot is free, so overlapping
    /// calls never leave an older capture on disk.
    pub async fn snapshot(&self) -> Result<()> {
        self.repository.save_latest(|| self.state().snapshot()).await
    }

    async fn persist(&self) {
        if let Err(e) = self.snapshot().await {
            warn!("Failed to persist chat state: {e}");
        }
    }
}
