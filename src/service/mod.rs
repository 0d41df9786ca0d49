pub mod conversation_store;
pub mod review_board;

pub use conversation_store::{ConversationStore, SendOutcome};
pub use review_board::ReviewBoard;
