//! Per-session conversation history storage for Ragbot.

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::HistoryError;
pub use memory::MemoryHistoryStore;
pub use store::{FileHistoryStore, HistoryStore};
pub use types::{ConversationWindow, DEFAULT_HISTORY_TURNS, Turn};
