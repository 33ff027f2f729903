//! Provider traits for the LLM backend and the embedding model.

use crate::{ApiError, ChatMessage};
use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future. Keeps the traits below dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A chat-completion backend.
///
/// Model name and sampling parameters are fixed at construction; callers
/// only supply the rendered prompt. Dyn-compatible so the pipeline works with
/// `Arc<dyn ChatModel>`.
pub trait ChatModel: Send + Sync {
    /// Run the prompt to completion and return the full response text.
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<String, ApiError>>;

    /// Provider name for logging (e.g., "openai").
    fn name(&self) -> &str;
}

/// A text embedding model.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. The result has one vector per input, in order.
    fn embed_documents<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, ApiError>>;

    /// Embed a single query string.
    fn embed_query<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, ApiError>>;
}
