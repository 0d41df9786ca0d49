use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Title used when a conversation is created without any seed text.
pub const DEFAULT_TITLE: &str = "New chat";

/// Text of the synthetic assistant message appended when a send fails.
pub const SEND_FAILED_TEXT: &str = "Failed to send the message. Please try again.";

const PENDING_PREFIX: &str = "temp_";
const ERROR_PREFIX: &str = "error_";

/// Opaque identifier issued by the chat service or generated locally.
///
/// The JSON form it arrived in (integer or string) is preserved, so ids are
/// written back to the service and to disk exactly as they were received.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(i64),
    Text(String),
}

pub type ChatId = RemoteId;
pub type MessageId = RemoteId;

impl RemoteId {
    /// Parses user input: integers become `Number`, anything else `Text`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        raw.parse::<i64>()
            .map(RemoteId::Number)
            .unwrap_or_else(|_| RemoteId::Text(raw.to_string()))
    }

    fn local(prefix: &str) -> Self {
        RemoteId::Text(format!("{prefix}{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn pending() -> Self {
        Self::local(PENDING_PREFIX)
    }

    pub fn error() -> Self {
        Self::local(ERROR_PREFIX)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RemoteId::Text(s) if s.starts_with(PENDING_PREFIX))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RemoteId::Text(s) if s.starts_with(ERROR_PREFIX))
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{n}"),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RemoteId {
    fn from(n: i64) -> Self {
        RemoteId::Number(n)
    }
}

impl From<i32> for RemoteId {
    fn from(n: i32) -> Self {
        RemoteId::Number(n.into())
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        RemoteId::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "chat_id")]
    pub id: ChatId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
}

impl Conversation {
    pub fn new(id: impl Into<ChatId>, title: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File metadata attached to a message. The payload itself never leaves the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default = "unknown_media_type")]
    pub media_type: String,
}

impl AttachmentRef {
    pub fn new(name: impl Into<String>, size: u64, media_type: impl Into<String>) -> Self {
        let media_type = media_type.into();
        Self {
            name: name.into(),
            size,
            media_type: if media_type.is_empty() { unknown_media_type() } else { media_type },
        }
    }

    /// Two selections are the same file when name and size both match.
    pub fn same_file(&self, other: &AttachmentRef) -> bool {
        self.name == other.name && self.size == other.size
    }
}

/// Current time at the millisecond precision timestamps are stored with.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

fn unknown_media_type() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text: String,
    #[serde(default = "now_millis", with = "ts_millis")]
    pub ts: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<AttachmentRef>,
}

impl Message {
    /// User message inserted before the service has confirmed it.
    pub fn pending_user(text: impl Into<String>, attachments: Vec<AttachmentRef>) -> Self {
        Self {
            id: MessageId::pending(),
            sender: Sender::User,
            text: text.into(),
            ts: now_millis(),
            attachments,
        }
    }

    pub fn assistant(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            sender: Sender::Assistant,
            text: text.into(),
            ts: now_millis(),
            attachments: Vec::new(),
        }
    }

    pub fn send_failure() -> Self {
        Self::assistant(MessageId::error(), SEND_FAILED_TEXT)
    }
}

// ── Wire types for the chat service ──────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NewChatRequest<'a> {
    pub title: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: &'a ChatId,
    pub message: &'a str,
    pub attachments: &'a [AttachmentRef],
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotReply {
    pub id: MessageId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageResponse {
    pub bot_response: BotReply,
}

/// A conversation's canonical transcript as the service reports it. The
/// title comes along because the service renames a chat from its first
/// message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// ── Reviews ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub user_id: String,
    pub rating: u8,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct NewReviewRequest<'a> {
    pub rating: u8,
    pub text: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub average_rating: f64,
    pub total_reviews: u64,
    #[serde(default)]
    pub distribution: BTreeMap<u8, u64>,
}

// ── Serde helpers ────────────────────────────────────────────────────────────

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Milliseconds since the Unix epoch. The service emits floats, we write integers.
mod ts_millis {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Int(i64),
        Float(f64),
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(ts.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let millis = match Millis::deserialize(deserializer)? {
            Millis::Int(ms) => ms,
            Millis::Float(ms) => ms.round() as i64,
        };
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {millis}")))
    }
}
