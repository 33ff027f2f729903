//! Corpus loading, chunking and vector retrieval for Ragbot.

pub mod corpus;
pub mod index;
pub mod loader;
pub mod retriever;
pub mod splitter;

pub use corpus::{Document, load_corpus};
pub use index::VectorIndex;
pub use loader::{BackendSettings, CorpusModelLoader, IndexSettings, build_index, load_or_build_index};
pub use retriever::{DEFAULT_TARGET_SOURCE_CHUNKS, VectorRetriever};
pub use splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, TextSplitter};
