//! Error hierarchy for Ragbot.

use thiserror::Error;

/// Top-level error type for chatbot operations.
#[derive(Debug, Error)]
pub enum ChatbotError {
    #[error("openai_api_key not provided")]
    MissingCredential,

    #[error("question not provided")]
    MissingQuestion,

    #[error("Model already initialized")]
    AlreadyInitialized,

    #[error("Failed to build retriever: {0}")]
    Build(#[source] RetrievalError),

    #[error("Model not initialized for session {session}")]
    NotInitialized { session: String },

    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] RetrievalError),

    #[error("Chat history error: {0}")]
    History(String),

    #[error("LLM error: {0}")]
    Llm(ApiError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
}

impl From<ApiError> for ChatbotError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(message) => ChatbotError::Transport(message),
            other => ChatbotError::Llm(other),
        }
    }
}

/// Errors from the OpenAI-compatible chat and embedding endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Server error: {status} {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Request timeout")]
    Timeout,
}

impl ApiError {
    /// Whether the request may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. }
                | ApiError::Server { .. }
                | ApiError::Network(_)
                | ApiError::Timeout
        )
    }
}

/// Errors from building or querying a retriever.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No documents found under {dir}")]
    EmptyCorpus { dir: String },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] ApiError),

    #[error("Vector index error: {0}")]
    Index(#[from] serde_json::Error),

    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCount { expected: usize, actual: usize },

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}
