pub mod http;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{AttachmentRef, BotReply, ChatId, Conversation, Review, ReviewStats, Transcript};

pub use http::HttpChatService;

/// The chat service the store synchronizes against.
#[async_trait]
pub trait ChatRemote: Send + Sync {
    async fn create_chat(&self, title: &str) -> Result<Conversation>;

    async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        attachments: &[AttachmentRef],
    ) -> Result<BotReply>;

    /// All conversations the service knows for this user, most recent first.
    async fn list_chats(&self) -> Result<Vec<Conversation>>;

    /// Canonical transcript of one conversation, oldest first, with the
    /// conversation's current title.
    async fn list_messages(&self, chat_id: &ChatId) -> Result<Transcript>;
}

/// Review endpoints of the same service.
#[async_trait]
pub trait ReviewRemote: Send + Sync {
    async fn submit_review(&self, rating: u8, text: &str) -> Result<Review>;

    async fn list_reviews(&self) -> Result<Vec<Review>>;

    async fn review_stats(&self) -> Result<ReviewStats>;

    async fn delete_review(&self, review_id: i64) -> Result<()>;
}
