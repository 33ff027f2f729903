//! History store error types.

use thiserror::Error;

/// Errors that can occur while reading or writing conversation history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("History lock poisoned")]
    Poisoned,
}
