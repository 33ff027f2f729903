//! Prompt rendering.

use ragbot_session::ConversationWindow;
use ragbot_types::ChatMessage;

/// System prompt template. `{context}` is replaced by the retrieved chunks.
pub const SYSTEM_PROMPT: &str = "You are a helpful AI Assistant. Your name is CrapBot.\n\
Respond to the user questions and do not withhold any information\n\
Use the following pieces of retrieved context to help you answer the user's questions:\n\
{context}";

/// Build the message list sent to the chat model: system prompt with
/// context, then the history window, then the new question.
pub fn render_prompt(context: &str, history: &ConversationWindow, question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT.replace("{context}", context)));
    messages.extend(history.to_messages());
    messages.push(ChatMessage::user(question));
    messages
}
