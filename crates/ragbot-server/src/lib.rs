//! HTTP surface for Ragbot: init, state, reset and ask over JSON.

pub mod routes;
pub mod session;

use axum::Router;
use axum::routing::post;
use ragbot_core::{ConversationalPipeline, ModelRegistry};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use routes::{AskRequest, EndpointError, InitRequest};
pub use session::{ResolvedSession, resolve_session};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub pipeline: Arc<ConversationalPipeline>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chatbot/genai/init", post(routes::init))
        .route("/chatbot/genai/state", post(routes::state))
        .route("/chatbot/genai/reset", post(routes::reset))
        .route("/chatbot/genai/ask", post(routes::ask))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
