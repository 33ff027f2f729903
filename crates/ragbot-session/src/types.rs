//! Conversation history data types.

use chrono::{DateTime, Utc};
use ragbot_types::ChatMessage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The default number of past turns fed back into the prompt.
pub const DEFAULT_HISTORY_TURNS: usize = 6;

/// One question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            answer: answer.into(),
            created_at: Utc::now(),
        }
    }
}

/// The most recent turns of a session, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ConversationWindow {
    turns: Vec<Turn>,
}

impl ConversationWindow {
    /// Keep only the last `max_turns` of `turns`.
    pub fn new(mut turns: Vec<Turn>, max_turns: usize) -> Self {
        let excess = turns.len().saturating_sub(max_turns);
        turns.drain(..excess);
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Alternating user/assistant messages for the prompt.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .flat_map(|t| {
                [
                    ChatMessage::user(t.question.as_str()),
                    ChatMessage::assistant(t.answer.as_str()),
                ]
            })
            .collect()
    }
}
