//! The ask pipeline: retrieve, recall history, prompt, complete, remember.

use crate::prompt::render_prompt;
use ragbot_session::{ConversationWindow, DEFAULT_HISTORY_TURNS, HistoryStore, Turn};
use ragbot_types::{ChatbotError, ModelHandle, SessionId, log_preview};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Tunables for [`ConversationalPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub history_turns: usize,
    pub llm_timeout: Duration,
    pub retrieval_timeout: Duration,
    /// Maximum pipeline runs in flight; further asks wait for a slot.
    pub max_concurrent: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            history_turns: DEFAULT_HISTORY_TURNS,
            llm_timeout: Duration::from_secs(120),
            retrieval_timeout: Duration::from_secs(30),
            max_concurrent: 32,
        }
    }
}

pub struct ConversationalPipeline {
    history: Arc<dyn HistoryStore>,
    settings: PipelineSettings,
    permits: Semaphore,
}

impl ConversationalPipeline {
    pub fn new(history: Arc<dyn HistoryStore>, settings: PipelineSettings) -> Self {
        let permits = Semaphore::new(settings.max_concurrent.max(1));
        Self {
            history,
            settings,
            permits,
        }
    }

    /// Answer `question` for `session` with `model`, then record the turn.
    ///
    /// Nothing is recorded when retrieval or the LLM call fails.
    pub async fn ask(
        &self,
        model: &ModelHandle,
        session: &SessionId,
        question: &str,
    ) -> Result<String, ChatbotError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ChatbotError::Transport(e.to_string()))?;

        tracing::debug!("Session {session} asks: {}", log_preview(question, 120));

        let chunks = with_timeout(
            "retrieval",
            self.settings.retrieval_timeout,
            model.retriever.retrieve(question),
        )
        .await?
        .map_err(ChatbotError::Retrieval)?;
        let context = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        tracing::debug!("Retrieved {} chunks for session {session}", chunks.len());

        let turns = self
            .history
            .load(session, self.settings.history_turns)
            .await
            .map_err(|e| ChatbotError::History(e.to_string()))?;
        let window = ConversationWindow::new(turns, self.settings.history_turns);

        let messages = render_prompt(&context, &window, question);
        let answer = with_timeout(
            "LLM call",
            self.settings.llm_timeout,
            model.llm.complete(&messages),
        )
        .await??;
        tracing::debug!("Session {session} answer: {}", log_preview(&answer, 120));

        self.history
            .append(session, Turn::new(question, answer.as_str()))
            .await
            .map_err(|e| {
                tracing::error!("Failed to save chat history for session {session}: {e}");
                ChatbotError::History(e.to_string())
            })?;

        Ok(answer)
    }
}

async fn with_timeout<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = T>,
) -> Result<T, ChatbotError> {
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        tracing::warn!("{operation} timed out after {}ms", limit.as_millis());
        ChatbotError::Timeout {
            operation,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    })
}
