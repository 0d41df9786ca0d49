pub mod key_value;
pub mod state_repository;

pub use key_value::{FileStore, KeyValueStore, MemoryStore};
pub use state_repository::{StateRepository, StateSnapshot};
