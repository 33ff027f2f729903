//! OpenAI-compatible chat completion and embedding client for Ragbot.

mod chat;
mod client;
mod embeddings;
mod retry;

pub use chat::{DEFAULT_CHAT_MODEL, DEFAULT_TEMPERATURE, OpenAiChatModel};
pub use client::{DEFAULT_BASE_URL, OpenAiClient};
pub use embeddings::{DEFAULT_EMBED_BATCH_SIZE, DEFAULT_EMBEDDING_MODEL, OpenAiEmbedder};
pub use retry::RetryConfig;
