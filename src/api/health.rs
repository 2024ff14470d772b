use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::store::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health/check", get(health_check))
}

/// Liveness of the secrets engine only; the metadata store and workflow
/// engine are not consulted.
async fn health_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if crate::health::probe(&state.http, &state.config.vault_addr).await {
        (StatusCode::OK, "Health check succeeded\n")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Health check failed\n")
    }
}
