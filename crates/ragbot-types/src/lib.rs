//! Shared types, collaborator traits and error hierarchy for Ragbot.

pub mod credential;
pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
mod util;

pub use credential::Credential;
pub use error::{ApiError, ChatbotError, ConfigError, RetrievalError};
pub use message::*;
pub use provider::{BoxFuture, ChatModel, Embedder};
pub use retrieval::{DocumentChunk, ModelHandle, ModelLoader, Retriever};
pub use util::{log_preview, truncate_str};
