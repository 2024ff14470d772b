use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;

use crate::error::ApiError;
use crate::validation;

/// JSON request body whose rejections (bad syntax, wrong shape, missing
/// content type) are reported as 400 with the standard error payload.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

/// A project name taken from the URL. Names that could never have been
/// created are reported as absent.
pub fn project_in_path(name: &str) -> Result<(), ApiError> {
    validation::check_project_name(name).map_err(|_| ApiError::NotFound("project".into()))
}

pub fn target_in_path(name: &str) -> Result<(), ApiError> {
    validation::check_target_name(name).map_err(|_| ApiError::NotFound("target".into()))
}
