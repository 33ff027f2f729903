//! Conversation history storage.

use crate::error::HistoryError;
use crate::types::Turn;
use ragbot_types::{BoxFuture, SessionId};
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Bytes read per step when scanning a history file backwards.
const TAIL_BLOCK: u64 = 16 * 1024;

/// Ordered per-session question/answer history.
///
/// Implementations must allow concurrent appends for distinct sessions.
pub trait HistoryStore: Send + Sync {
    fn append<'a>(&'a self, session: &'a SessionId, turn: Turn) -> BoxFuture<'a, Result<(), HistoryError>>;

    /// The last `max_turns` turns, oldest first. Unknown sessions have none.
    fn load<'a>(
        &'a self,
        session: &'a SessionId,
        max_turns: usize,
    ) -> BoxFuture<'a, Result<Vec<Turn>, HistoryError>>;

    /// Erase all turns of a session. Clearing an unknown session succeeds.
    fn clear<'a>(&'a self, session: &'a SessionId) -> BoxFuture<'a, Result<(), HistoryError>>;
}

/// File-based store: one JSON-lines file per session in `histories_dir`.
///
/// File names are the SHA-256 of the session id, since ids are arbitrary
/// header values.
pub struct FileHistoryStore {
    histories_dir: PathBuf,
}

impl FileHistoryStore {
    /// Create a new store, ensuring `<persist_dir>/chat_histories` exists.
    pub async fn new(persist_dir: PathBuf) -> Result<Self, HistoryError> {
        let histories_dir = persist_dir.join("chat_histories");
        tokio::fs::create_dir_all(&histories_dir).await?;
        Ok(Self { histories_dir })
    }

    fn history_path(&self, session: &SessionId) -> PathBuf {
        let name = hex::encode(Sha256::digest(session.as_str().as_bytes()));
        self.histories_dir.join(format!("{name}.jsonl"))
    }

    async fn append_inner(&self, session: &SessionId, turn: Turn) -> Result<(), HistoryError> {
        let mut line = serde_json::to_vec(&turn)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path(session))
            .await?;
        // One write per turn so concurrent appends never interleave mid-line.
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Reads backwards from the end of the file, so cost tracks the size
    /// of the last `max_turns` turns rather than the whole history.
    async fn load_inner(&self, session: &SessionId, max_turns: usize) -> Result<Vec<Turn>, HistoryError> {
        let path = self.history_path(session);
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if max_turns == 0 {
            return Ok(Vec::new());
        }

        let mut pos = file.metadata().await?.len();
        let mut tail: Vec<u8> = Vec::new();
        while pos > 0 {
            let step = TAIL_BLOCK.min(pos);
            pos -= step;
            file.seek(SeekFrom::Start(pos)).await?;
            let mut block = vec![0u8; step as usize];
            file.read_exact(&mut block).await?;
            block.extend_from_slice(&tail);
            tail = block;

            // Before the start of file, the first line may be cut off.
            let complete = if pos == 0 {
                &tail[..]
            } else {
                match tail.iter().position(|&b| b == b'\n') {
                    Some(i) => &tail[i + 1..],
                    None => continue,
                }
            };
            let turns = parse_turns(complete, &path);
            if turns.len() >= max_turns || pos == 0 {
                return Ok(keep_last(turns, max_turns));
            }
        }
        Ok(Vec::new())
    }

    async fn clear_inner(&self, session: &SessionId) -> Result<(), HistoryError> {
        match tokio::fs::remove_file(self.history_path(session)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_turns(data: &[u8], path: &Path) -> Vec<Turn> {
    data.split(|&b| b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .filter_map(|line| match serde_json::from_slice(line) {
            Ok(turn) => Some(turn),
            Err(e) => {
                tracing::warn!("Skipping corrupt history line in {}: {e}", path.display());
                None
            }
        })
        .collect()
}

fn keep_last(mut turns: Vec<Turn>, max_turns: usize) -> Vec<Turn> {
    let excess = turns.len().saturating_sub(max_turns);
    turns.drain(..excess);
    turns
}

impl HistoryStore for FileHistoryStore {
    fn append<'a>(&'a self, session: &'a SessionId, turn: Turn) -> BoxFuture<'a, Result<(), HistoryError>> {
        Box::pin(self.append_inner(session, turn))
    }

    fn load<'a>(
        &'a self,
        session: &'a SessionId,
        max_turns: usize,
    ) -> BoxFuture<'a, Result<Vec<Turn>, HistoryError>> {
        Box::pin(self.load_inner(session, max_turns))
    }

    fn clear<'a>(&'a self, session: &'a SessionId) -> BoxFuture<'a, Result<(), HistoryError>> {
        Box::pin(self.clear_inner(session))
    }
}
