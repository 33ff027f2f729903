//! Embeddings backend.

use crate::client::OpenAiClient;
use ragbot_types::{ApiError, BoxFuture, Embedder};
use serde::{Deserialize, Serialize};

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Inputs sent per `/v1/embeddings` request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// `POST /v1/embeddings`, batching large inputs.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: batch,
        };
        let response: EmbeddingResponse = self.client.post_json("/v1/embeddings", &request).await?;
        order_embeddings(response.data, batch.len())
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (n, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!("Embedding batch {} ({} inputs)", n + 1, batch.len());
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

/// Put embeddings back in input order and check nothing is missing.
fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>, ApiError> {
    if data.len() != expected {
        return Err(ApiError::Decode(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

impl Embedder for OpenAiEmbedder {
    fn embed_documents<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, ApiError>> {
        Box::pin(self.embed_all(texts))
    }

    fn embed_query<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, ApiError>> {
        Box::pin(async move {
            let input = [text.to_string()];
            let mut vectors = self.embed_batch(&input).await?;
            vectors
                .pop()
                .ok_or_else(|| ApiError::Decode("empty embedding response".into()))
        })
    }
}
