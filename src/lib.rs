pub mod config;
pub mod error;
pub mod health;
pub mod store;
pub mod validation;

// Collaborator boundaries
pub mod credentials;
pub mod git;
pub mod workflow;

// HTTP surface
pub mod api;
pub mod auth;

use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::store::AppState;

/// Request bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Full application router with per-request tracing.
pub fn app(state: AppState) -> Router {
    api::router()
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
