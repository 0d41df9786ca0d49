//! Client-side synchronization core for a conversational chat service.
//!
//! The [`ConversationStore`] keeps conversations and their transcripts in
//! memory, applies sends optimistically, reconciles them with the service
//! through a [`ChatRemote`] and snapshots everything to a [`KeyValueStore`].

pub mod config;
pub mod console;
pub mod errors;
pub mod models;
pub mod remote;
pub mod service;
pub mod storage;

pub use config::Config;
pub use errors::{AppError, Result};
pub use remote::{ChatRemote, HttpChatService, ReviewRemote};
pub use service::{ConversationStore, ReviewBoard, SendOutcome};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StateRepository};
