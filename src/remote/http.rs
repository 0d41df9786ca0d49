use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::errors::{AppError, Result};
use crate::models::{
    AttachmentRef, BotReply, ChatId, Conversation, ErrorBody, NewChatRequest,
    NewReviewRequest, Review, ReviewStats, SendMessageRequest, SendMessageResponse, Transcript,
};
use crate::remote::{ChatRemote, ReviewRemote};

/// Header the service scopes every request by.
pub const USER_ID_HEADER: &str = "X-User-ID";

/// `reqwest` client for the chat service's JSON API.
#[derive(Clone)]
pub struct HttpChatService {
    client: reqwest::Client,
    base_url: Url,
    user_id: String,
}

impl HttpChatService {
    pub fn new(base_url: &str, user_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config { message: format!("Failed to build HTTP client: {e}") })?;
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| AppError::Config { message: format!("Invalid service URL '{base_url}': {e}") })?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config { message: format!("Service URL '{base_url}' cannot carry a path") });
        }
        Ok(Self { client, base_url, user_id: user_id.into() })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Appends `segments` to the base URL, percent-encoding each one, so an
    /// id holding `/` or spaces stays a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.client
            .request(method, self.endpoint(segments))
            .header(USER_ID_HEADER, &self.user_id)
    }

    /// Sends the request and decodes a 2xx body. Transport failures and
    /// non-2xx responses both become `RemoteUnavailable`; the service's
    /// `{"error": ...}` text is used as the reason when present.
    async fn execute<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<T> {
        let resp = request.send().await.map_err(|e| {
            error!("Chat service request '{operation}' failed: {e}");
            AppError::remote(operation, e)
        })?;

        let status = resp.status();
        if !status.is_success() {
            let reason = match resp.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => format!("Server error: {status}"),
            };
            error!("Chat service rejected '{operation}' with {status}: {reason}");
            return Err(AppError::remote(operation, reason));
        }

        debug!("Chat service '{operation}' returned {status}");
        resp.json::<T>().await.map_err(|e| {
            error!("Failed to decode '{operation}' response: {e}");
            AppError::remote(operation, format!("Parse error: {e}"))
        })
    }
}

#[async_trait]
impl ChatRemote for HttpChatService {
    async fn create_chat(&self, title: &str) -> Result<Conversation> {
        let req = self.request(Method::POST, &["new_chat"]).json(&NewChatRequest { title });
        self.execute("create chat", req).await
    }

    async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        attachments: &[AttachmentRef],
    ) -> Result<BotReply> {
        let body = SendMessageRequest { chat_id, message: text, attachments };
        let req = self.request(Method::POST, &["send_message"]).json(&body);
        let resp: SendMessageResponse = self.execute("send message", req).await?;
        Ok(resp.bot_response)
    }

    async fn list_chats(&self) -> Result<Vec<Conversation>> {
        let req = self.request(Method::GET, &["chat_history"]);
        self.execute("list chats", req).await
    }

    async fn list_messages(&self, chat_id: &ChatId) -> Result<Transcript> {
        let chat_id = chat_id.to_string();
        let req = self.request(Method::GET, &["chat", &chat_id, "messages"]);
        self.execute("list messages", req).await
    }
}

#[async_trait]
impl ReviewRemote for HttpChatService {
    async fn submit_review(&self, rating: u8, text: &str) -> Result<Review> {
        let req = self
            .request(Method::POST, &["reviews"])
            .json(&NewReviewRequest { rating, text });
        self.execute("submit review", req).await
    }

    async fn list_reviews(&self) -> Result<Vec<Review>> {
        self.execute("list reviews", self.request(Method::GET, &["reviews"])).await
    }

    async fn review_stats(&self) -> Result<ReviewStats> {
        self.execute("review stats", self.request(Method::GET, &["reviews", "stats"])).await
    }

    async fn delete_review(&self, review_id: i64) -> Result<()> {
        let review_id = review_id.to_string();
        let req = self.request(Method::DELETE, &["reviews", &review_id]);
        let _: serde_json::Value = self.execute("delete review", req).await?;
        Ok(())
    }
}
