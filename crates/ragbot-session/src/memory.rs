//! In-memory history store, for tests and ephemeral deployments.

use crate::error::HistoryError;
use crate::store::HistoryStore;
use crate::types::Turn;
use ragbot_types::{BoxFuture, SessionId};
use std::collections::HashMap;
use std::sync::Mutex;

/// History kept in a process-local map. Lost on restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    sessions: Mutex<HashMap<SessionId, Vec<Turn>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_sessions<T>(
        &self,
        f: impl FnOnce(&mut HashMap<SessionId, Vec<Turn>>) -> T,
    ) -> Result<T, HistoryError> {
        let mut sessions = self.sessions.lock().map_err(|_| HistoryError::Poisoned)?;
        Ok(f(&mut sessions))
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append<'a>(&'a self, session: &'a SessionId, turn: Turn) -> BoxFuture<'a, Result<(), HistoryError>> {
        let result = self.with_sessions(|s| s.entry(session.clone()).or_default().push(turn));
        Box::pin(async move { result })
    }

    fn load<'a>(
        &'a self,
        session: &'a SessionId,
        max_turns: usize,
    ) -> BoxFuture<'a, Result<Vec<Turn>, HistoryError>> {
        let result = self.with_sessions(|s| {
            let turns = s.get(session).map(Vec::as_slice).unwrap_or_default();
            turns[turns.len().saturating_sub(max_turns)..].to_vec()
        });
        Box::pin(async move { result })
    }

    fn clear<'a>(&'a self, session: &'a SessionId) -> BoxFuture<'a, Result<(), HistoryError>> {
        let result = self.with_sessions(|s| {
            s.remove(session);
        });
        Box::pin(async move { result })
    }
}
