//! Retriever over a [`VectorIndex`].

use crate::index::VectorIndex;
use ragbot_types::{BoxFuture, DocumentChunk, Embedder, RetrievalError, Retriever};
use std::sync::Arc;

/// The default number of chunks returned per query.
pub const DEFAULT_TARGET_SOURCE_CHUNKS: usize = 4;

/// Embeds the query and returns the `k` nearest chunks.
pub struct VectorRetriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    k: usize,
}

impl VectorRetriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>, k: usize) -> Self {
        Self { index, embedder, k }
    }
}

impl Retriever for VectorRetriever {
    fn retrieve<'a>(
        &'a self,
        query: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DocumentChunk>, RetrievalError>> {
        Box::pin(async move {
            let vector = self.embedder.embed_query(query).await?;
            Ok(self.index.search(&vector, self.k))
        })
    }
}
