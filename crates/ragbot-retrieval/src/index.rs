//! In-memory vector index with JSON persistence.

use ragbot_types::{DocumentChunk, RetrievalError};
use serde::{Deserialize, Serialize};
use std::path::Path;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: DocumentChunk,
    embedding: Vec<f32>,
}

/// Embedded chunks searchable by cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    /// Model that produced the embeddings; a cached index built with a
    /// different model is not reused.
    pub embedding_model: String,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: DocumentChunk, embedding: Vec<f32>) {
        self.entries.push(IndexEntry { chunk, embedding });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` chunks most similar to `query`, best first. Ties keep
    /// insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<DocumentChunk> {
        let mut scored: Vec<(f32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (cosine_similarity(query, &e.embedding), i))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(k)
            .map(|(_, i)| self.entries[i].chunk.clone())
            .collect()
    }

    /// Write the index to `dir/index.json` (atomic write: .tmp → rename).
    pub async fn save(&self, dir: &Path) -> Result<(), RetrievalError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(INDEX_FILE);
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_vec(self)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    /// Read a previously saved index. `Ok(None)` when none exists.
    pub async fn load(dir: &Path) -> Result<Option<Self>, RetrievalError> {
        let path = dir.join(INDEX_FILE);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let data = tokio::fs::read(&path).await?;
        Ok(Some(serde_json::from_slice(&data)?))
    }
}

/// Cosine similarity; 0.0 when either vector has zero length or the
/// dimensions differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(text: &str) -> DocumentChunk {
        DocumentChunk {
            text: text.to_string(),
            source: "doc.md".to_string(),
        }
    }

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new("test-embed");
        index.push(chunk("north"), vec![0.0, 1.0]);
        index.push(chunk("east"), vec![1.0, 0.0]);
        index.push(chunk("north-east"), vec![1.0, 1.0]);
        index
    }

    #[test]
    fn search_ranks_by_cosine() {
        let index = sample_index();
        let hits = index.search(&[1.0, 0.1], 2);
        let texts: Vec<_> = hits.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "north-east"]);
    }

    #[test]
    fn search_caps_at_available_entries() {
        let index = sample_index();
        assert_eq!(index.search(&[0.0, 1.0], 10).len(), 3);
        assert!(VectorIndex::new("m").search(&[1.0], 4).is_empty());
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn save_and_load() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("dbabc");
        assert!(VectorIndex::load(&dir).await.unwrap().is_none());

        sample_index().save(&dir).await.unwrap();
        let loaded = VectorIndex::load(&dir).await.unwrap().unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.embedding_model, "test-embed");
        assert_eq!(loaded.search(&[0.0, 1.0], 1)[0].text, "north");
        assert!(!dir.join("index.tmp").exists());
    }
}
