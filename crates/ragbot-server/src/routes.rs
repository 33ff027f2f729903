//! Request handlers and their JSON shapes.

use crate::AppState;
use crate::session::ResolvedSession;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ragbot_core::SessionState;
use ragbot_types::{ChatbotError, Credential};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct InitRequest {
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// `initialized` is the string `"true"` or `"false"`, as clients expect.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub initialized: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub initialized: &'static str,
    pub answer: String,
}

/// Which handler an error came from; each maps failures differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Init,
    State,
    Reset,
    Ask,
}

/// A handler failure, rendered as `{message}` with the endpoint's status.
#[derive(Debug)]
pub struct EndpointError {
    pub endpoint: Endpoint,
    pub error: ChatbotError,
}

impl EndpointError {
    pub fn new(endpoint: Endpoint, error: ChatbotError) -> Self {
        Self { endpoint, error }
    }
}

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        match (self.endpoint, &self.error) {
            (Endpoint::Init, ChatbotError::MissingCredential) => {
                (StatusCode::BAD_REQUEST, MessageResponse::new(self.error.to_string())).into_response()
            }
            (Endpoint::Init, _) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                MessageResponse::new(format!("Not able to initialize model {}", self.error)),
            )
                .into_response(),
            // State failures are reported with 200; clients poll this endpoint
            // and only inspect `initialized`.
            (Endpoint::State, _) => (
                StatusCode::OK,
                MessageResponse::new(format!("Error checking state {}", self.error)),
            )
                .into_response(),
            (Endpoint::Reset, _) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                MessageResponse::new("Error deleting chat history"),
            )
                .into_response(),
            (Endpoint::Ask, ChatbotError::MissingQuestion) => {
                (StatusCode::BAD_REQUEST, MessageResponse::new(self.error.to_string())).into_response()
            }
            (Endpoint::Ask, ChatbotError::NotInitialized { .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StateResponse {
                    initialized: "false",
                    message: self.error.to_string(),
                }),
            )
                .into_response(),
            (Endpoint::Ask, _) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                MessageResponse::new(self.error.to_string()),
            )
                .into_response(),
        }
    }
}

/// `POST /chatbot/genai/init`. A missing or unparsable body counts as no key.
pub async fn init(
    State(state): State<AppState>,
    session: ResolvedSession,
    body: Option<Json<InitRequest>>,
) -> Result<Json<MessageResponse>, EndpointError> {
    tracing::debug!("Initializing bot for session {}", *session);
    let credential = body
        .and_then(|Json(req)| req.openai_api_key)
        .filter(|key| !key.trim().is_empty())
        .map(Credential::new);

    match state.registry.init_session(&session, credential).await {
        Ok(()) => Ok(MessageResponse::new("Model Initialized")),
        Err(ChatbotError::AlreadyInitialized) => {
            tracing::info!("Model already initialized with the shared API key");
            Ok(MessageResponse::new("Model Already Initialized"))
        }
        Err(e) => {
            tracing::error!("Error initializing bot for session {}: {e}", *session);
            Err(EndpointError::new(Endpoint::Init, e))
        }
    }
}

/// `POST /chatbot/genai/state`.
pub async fn state(
    State(state): State<AppState>,
    session: ResolvedSession,
) -> Result<Json<StateResponse>, EndpointError> {
    tracing::debug!("Checking state for session {}", *session);
    let response = match state.registry.get_state(&session) {
        SessionState::Ready => StateResponse {
            initialized: "true",
            message: "Model already loaded".to_string(),
        },
        SessionState::Initializing => StateResponse {
            initialized: "false",
            message: "Model initialization in progress".to_string(),
        },
        SessionState::NotReady => StateResponse {
            initialized: "false",
            message: "Model needs to be initialized".to_string(),
        },
    };
    Ok(Json(response))
}

/// `POST /chatbot/genai/reset`. Clears history only; readiness is unchanged.
pub async fn reset(
    State(state): State<AppState>,
    session: ResolvedSession,
) -> Result<Json<MessageResponse>, EndpointError> {
    state
        .registry
        .clear_session_history(&session)
        .await
        .map_err(|e| EndpointError::new(Endpoint::Reset, e))?;
    Ok(MessageResponse::new("Deleted chat history"))
}

/// `POST /chatbot/genai/ask`. Readiness is checked before the body is read.
pub async fn ask(
    State(state): State<AppState>,
    session: ResolvedSession,
    body: Option<Json<AskRequest>>,
) -> Result<Json<AskResponse>, EndpointError> {
    let Some(model) = state.registry.lookup(&session) else {
        tracing::error!("Model not initialized for session {}", *session);
        return Err(EndpointError::new(
            Endpoint::Ask,
            ChatbotError::NotInitialized {
                session: session.to_string(),
            },
        ));
    };
    let Some(Json(req)) = body else {
        tracing::warn!("Ask without a question for session {}", *session);
        return Err(EndpointError::new(Endpoint::Ask, ChatbotError::MissingQuestion));
    };

    let answer = state
        .pipeline
        .ask(&model, &session, &req.question)
        .await
        .map_err(|e| {
            tracing::error!("Ask failed for session {}: {e}", *session);
            EndpointError::new(Endpoint::Ask, e)
        })?;

    Ok(Json(AskResponse {
        initialized: "true",
        answer,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragbot_types::{ApiError, RetrievalError};

    async fn render(err: EndpointError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_key_is_a_client_error() {
        let (status, body) =
            render(EndpointError::new(Endpoint::Init, ChatbotError::MissingCredential)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "openai_api_key not provided");
    }

    #[tokio::test]
    async fn build_failure_embeds_cause() {
        let err = ChatbotError::Build(RetrievalError::EmptyCorpus {
            dir: "./retrieval".into(),
        });
        let (status, body) = render(EndpointError::new(Endpoint::Init, err)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["message"].as_str().unwrap();
        assert!(message.starts_with("Not able to initialize model "));
        assert!(message.contains("No documents found under ./retrieval"));
    }

    // State errors stay 200 so polling clients keep working; pinned here so a
    // change to that contract is deliberate.
    #[tokio::test]
    async fn state_errors_are_reported_with_ok_status() {
        let err = ChatbotError::History("lock poisoned".into());
        let (status, body) = render(EndpointError::new(Endpoint::State, err)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().starts_with("Error checking state "));
        assert!(body.get("initialized").is_none());
    }

    #[tokio::test]
    async fn reset_failure_hides_cause() {
        let err = ChatbotError::History("permission denied".into());
        let (status, body) = render(EndpointError::new(Endpoint::Reset, err)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Error deleting chat history");
    }

    #[tokio::test]
    async fn ask_errors() {
        let (status, body) = render(EndpointError::new(
            Endpoint::Ask,
            ChatbotError::NotInitialized {
                session: "10.0.0.1".into(),
            },
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["initialized"], "false");
        assert_eq!(body["message"], "Model not initialized for session 10.0.0.1");

        let (status, body) = render(EndpointError::new(
            Endpoint::Ask,
            ApiError::Auth {
                message: "invalid key".into(),
            }
            .into(),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "LLM error: Authentication failed: invalid key");

        let (status, body) =
            render(EndpointError::new(Endpoint::Ask, ChatbotError::MissingQuestion)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "question not provided");
        assert!(body.get("initialized").is_none());
    }
}
