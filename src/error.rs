use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Duplicate resource or deletion blocked by dependents. Reported as 400.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error")]
    Validation(Vec<String>),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::Conflict(_) | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::NotFound(msg) => serde_json::json!({ "error": format!("{msg} not found") }),
            Self::Unauthorized => serde_json::json!({ "error": "unauthorized" }),
            Self::BadRequest(msg) | Self::Conflict(msg) | Self::ServiceUnavailable(msg) => {
                serde_json::json!({ "error": msg })
            }
            Self::Validation(errors) => {
                serde_json::json!({ "error": "validation error", "fields": errors })
            }
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                serde_json::json!({ "error": "internal server error" })
            }
        };

        (status, axum::Json(body)).into_response()
    }
}
