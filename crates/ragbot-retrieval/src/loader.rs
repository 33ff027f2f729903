//! Building a [`ModelHandle`] for a credential: corpus → chunks → embeddings
//! → index, cached on disk per credential fingerprint.

use crate::corpus::load_corpus;
use crate::index::VectorIndex;
use crate::retriever::{DEFAULT_TARGET_SOURCE_CHUNKS, VectorRetriever};
use crate::splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, TextSplitter};
use ragbot_api::{
    DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBED_BATCH_SIZE, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_TEMPERATURE, OpenAiChatModel, OpenAiClient, OpenAiEmbedder, RetryConfig,
};
use ragbot_types::{
    BoxFuture, Credential, DocumentChunk, Embedder, ModelHandle, ModelLoader, RetrievalError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Where the corpus lives and how it is chunked, embedded and cached.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub corpus_dir: PathBuf,
    pub persist_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
    pub target_source_chunks: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("./retrieval"),
            persist_dir: PathBuf::from("./persist"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            target_source_chunks: DEFAULT_TARGET_SOURCE_CHUNKS,
        }
    }
}

impl IndexSettings {
    /// Cache directory for the index built with the given credential.
    pub fn cache_dir(&self, fingerprint: &str) -> PathBuf {
        self.persist_dir.join(format!("db{fingerprint}"))
    }
}

/// Upstream API parameters for the clients bound to each credential.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    pub embed_batch_size: usize,
    pub retry: RetryConfig,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            retry: RetryConfig::default(),
        }
    }
}

/// Load the cached index for `fingerprint`, or build it from the corpus and
/// cache it.
pub async fn load_or_build_index(
    embedder: &dyn Embedder,
    settings: &IndexSettings,
    fingerprint: &str,
) -> Result<VectorIndex, RetrievalError> {
    let cache_dir = settings.cache_dir(fingerprint);
    match VectorIndex::load(&cache_dir).await {
        Ok(Some(index)) if index.embedding_model == settings.embedding_model => {
            tracing::info!(
                "Reusing cached index at {} ({} chunks)",
                cache_dir.display(),
                index.len()
            );
            return Ok(index);
        }
        Ok(Some(index)) => tracing::info!(
            "Cached index at {} was built with {}, rebuilding",
            cache_dir.display(),
            index.embedding_model
        ),
        Ok(None) => {}
        Err(e) => tracing::warn!("Ignoring unreadable index at {}: {e}", cache_dir.display()),
    }

    let index = build_index(embedder, settings).await?;
    if let Err(e) = index.save(&cache_dir).await {
        tracing::warn!("Failed to cache index at {}: {e}", cache_dir.display());
    }
    Ok(index)
}

/// Load, split and embed the whole corpus.
pub async fn build_index(
    embedder: &dyn Embedder,
    settings: &IndexSettings,
) -> Result<VectorIndex, RetrievalError> {
    let started = Instant::now();
    let chunks = chunk_corpus(settings).await?;
    if chunks.is_empty() {
        return Err(RetrievalError::EmptyCorpus {
            dir: settings.corpus_dir.display().to_string(),
        });
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed_documents(&texts).await?;
    if embeddings.len() != chunks.len() {
        return Err(RetrievalError::EmbeddingCount {
            expected: chunks.len(),
            actual: embeddings.len(),
        });
    }

    let mut index = VectorIndex::new(settings.embedding_model.clone());
    for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
        index.push(chunk, embedding);
    }
    tracing::info!(
        "Embedded {} chunks in {:.1}s",
        index.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(index)
}

/// Walk and split the corpus on the blocking pool.
async fn chunk_corpus(settings: &IndexSettings) -> Result<Vec<DocumentChunk>, RetrievalError> {
    let dir = settings.corpus_dir.clone();
    let splitter = TextSplitter::new(settings.chunk_size, settings.chunk_overlap);

    tokio::task::spawn_blocking(move || split_documents(&dir, &splitter))
        .await
        .map_err(|e| RetrievalError::Task(e.to_string()))?
}

fn split_documents(dir: &Path, splitter: &TextSplitter) -> Result<Vec<DocumentChunk>, RetrievalError> {
    tracing::info!("Loading documents from {}", dir.display());
    let documents = load_corpus(dir)?;
    tracing::info!("Loaded {} documents", documents.len());

    Ok(documents
        .iter()
        .flat_map(|doc| {
            splitter
                .split_text(&doc.text)
                .into_iter()
                .map(|text| DocumentChunk {
                    text,
                    source: doc.source.clone(),
                })
        })
        .collect())
}

/// [`ModelLoader`] backed by the on-disk corpus and OpenAI-compatible APIs.
pub struct CorpusModelLoader {
    index: IndexSettings,
    backend: BackendSettings,
}

impl CorpusModelLoader {
    pub fn new(index: IndexSettings, backend: BackendSettings) -> Self {
        Self { index, backend }
    }

    async fn load_inner(&self, credential: &Credential) -> Result<ModelHandle, RetrievalError> {
        let fingerprint = credential.fingerprint();
        tracing::debug!("Loading retriever for key {}", credential.short_fingerprint());

        let client = OpenAiClient::new(credential, &self.backend.base_url)?
            .with_retry_config(self.backend.retry.clone());
        let embedder: Arc<dyn Embedder> = Arc::new(
            OpenAiEmbedder::new(client.clone(), &self.index.embedding_model)
                .with_batch_size(self.backend.embed_batch_size),
        );
        let llm = Arc::new(OpenAiChatModel::new(
            client,
            &self.backend.chat_model,
            self.backend.temperature,
        ));

        let index = load_or_build_index(embedder.as_ref(), &self.index, &fingerprint).await?;
        let retriever = VectorRetriever::new(
            Arc::new(index),
            embedder,
            self.index.target_source_chunks,
        );

        tracing::info!("Retriever ready for key {}", credential.short_fingerprint());
        Ok(ModelHandle {
            retriever: Arc::new(retriever),
            llm,
            fingerprint,
        })
    }
}

impl ModelLoader for CorpusModelLoader {
    fn load<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BoxFuture<'a, Result<ModelHandle, RetrievalError>> {
        Box::pin(self.load_inner(credential))
    }
}
