//! Chat completions backend.

use crate::client::OpenAiClient;
use ragbot_types::{ApiError, BoxFuture, ChatMessage, ChatModel};
use serde::{Deserialize, Serialize};

/// The default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

/// The default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.6;

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// `POST /v1/chat/completions` with a fixed model and temperature.
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(client: OpenAiClient, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_inner(&self, messages: &[ChatMessage]) -> Result<String, ApiError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };
        let response: ChatCompletionResponse =
            self.client.post_json("/v1/chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ApiError::Decode("completion contained no message content".into()))
    }
}

impl ChatModel for OpenAiChatModel {
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<String, ApiError>> {
        Box::pin(self.complete_inner(messages))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragbot_types::Credential;

    #[test]
    fn request_serializes_messages_in_order() {
        let messages = vec![ChatMessage::system("ctx"), ChatMessage::user("hello")];
        let request = ChatCompletionRequest {
            model: "gpt-4o",
            messages: &messages,
            temperature: 0.6,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn response_parses_first_choice() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Hi!"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hi!"));
    }

    #[test]
    fn chat_model_name_and_model() {
        let client = OpenAiClient::new(&Credential::new("k"), "http://localhost").unwrap();
        let llm = OpenAiChatModel::new(client, DEFAULT_CHAT_MODEL, DEFAULT_TEMPERATURE);
        assert_eq!(llm.name(), "openai");
        assert_eq!(llm.model(), "gpt-4o");
    }
}
