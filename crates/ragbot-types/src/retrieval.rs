//! Retriever traits and the handle the model registry hands out.

use crate::provider::{BoxFuture, ChatModel};
use crate::{Credential, RetrievalError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A text chunk returned by a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    /// Path of the source document, relative to the corpus root.
    pub source: String,
}

/// Answers "top-k relevant chunks for query Q". Read-only after construction.
pub trait Retriever: Send + Sync {
    fn retrieve<'a>(
        &'a self,
        query: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DocumentChunk>, RetrievalError>>;
}

/// Everything needed to answer questions for one credential: the retriever
/// over the embedded corpus and the chat model using the same key.
#[derive(Clone)]
pub struct ModelHandle {
    pub retriever: Arc<dyn Retriever>,
    pub llm: Arc<dyn ChatModel>,
    /// SHA-256 fingerprint of the credential the handle was built from.
    pub fingerprint: String,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("llm", &self.llm.name())
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Builds a [`ModelHandle`] for a credential. Expensive: loads, chunks and
/// embeds the document corpus unless a cached index exists for the key.
pub trait ModelLoader: Send + Sync {
    fn load<'a>(&'a self, credential: &'a Credential)
    -> BoxFuture<'a, Result<ModelHandle, RetrievalError>>;
}
