//! Loading the document corpus from disk.

use ragbot_types::RetrievalError;
use std::path::Path;
use walkdir::WalkDir;

/// Extensions never loaded as text.
const EXCLUDED_EXTENSIONS: &[&str] = &["png", "pdf"];

/// Directory name whose subtree is skipped entirely.
const EXCLUDED_DIR: &str = "images";

/// A loaded source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the corpus root.
    pub source: String,
    pub text: String,
}

/// Recursively load every text document under `root`, in path order.
///
/// Blocking: call from `spawn_blocking`. Files that are not valid UTF-8 or
/// contain only whitespace are skipped.
pub fn load_corpus(root: &Path) -> Result<Vec<Document>, RetrievalError> {
    let mut documents = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != EXCLUDED_DIR);

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() || is_excluded(entry.path()) {
            continue;
        }

        let source = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .display()
            .to_string();

        let bytes = std::fs::read(entry.path())?;
        match String::from_utf8(bytes) {
            Ok(text) if !text.trim().is_empty() => documents.push(Document { source, text }),
            Ok(_) => tracing::debug!("Skipping empty document {source}"),
            Err(_) => tracing::warn!("Skipping non-UTF-8 document {source}"),
        }
    }

    Ok(documents)
}

fn is_excluded(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            EXCLUDED_EXTENSIONS
                .iter()
                .any(|x| x.eq_ignore_ascii_case(ext))
        })
}
