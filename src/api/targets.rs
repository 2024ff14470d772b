use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::helpers::{JsonBody, project_in_path, target_in_path};
use crate::auth::AdminAuth;
use crate::credentials::{Target, TargetPatch};
use crate::error::ApiError;
use crate::store::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/{project}/targets",
            get(list_targets).post(create_target),
        )
        .route(
            "/projects/{project}/targets/{target}",
            get(get_target).patch(update_target).delete(delete_target),
        )
}

#[tracing::instrument(skip(state, target), fields(target = %target.name), err)]
async fn create_target(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(project): Path<String>,
    JsonBody(target): JsonBody<Target>,
) -> Result<Json<Target>, ApiError> {
    let project_known = project_in_path(&project).is_ok()
        && state.credentials.project_exists(&project).await?;
    if !project_known {
        return Err(ApiError::BadRequest("project does not exist".into()));
    }

    target.validate()?;

    if state.credentials.target_exists(&project, &target.name).await? {
        return Err(ApiError::Conflict("target already exists".into()));
    }

    state
        .credentials
        .create_target(&project, &target)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    tracing::info!("target created");
    Ok(Json(target))
}

async fn list_targets(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(project): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    project_in_path(&project)?;
    Ok(Json(state.credentials.list_targets(&project).await?))
}

async fn get_target(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path((project, target)): Path<(String, String)>,
) -> Result<Json<Target>, ApiError> {
    project_in_path(&project)?;
    target_in_path(&target)?;
    if !state.credentials.project_exists(&project).await? {
        return Err(ApiError::NotFound("project".into()));
    }
    Ok(Json(state.credentials.get_target(&project, &target).await?))
}

/// Merge the patch into the stored target's properties. Identity fields in
/// the body are ignored and `credential_type` cannot change.
#[tracing::instrument(skip(state, patch), err)]
async fn update_target(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path((project, target)): Path<(String, String)>,
    JsonBody(patch): JsonBody<TargetPatch>,
) -> Result<Json<Target>, ApiError> {
    project_in_path(&project)?;
    target_in_path(&target)?;
    if !state.credentials.project_exists(&project).await? {
        return Err(ApiError::NotFound("project".into()));
    }

    let current = state.credentials.get_target(&project, &target).await?;
    let merged = current.apply_patch(patch)?;
    merged.validate()?;

    state
        .credentials
        .update_target(&project, &merged)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    tracing::info!("target updated");
    Ok(Json(merged))
}

#[tracing::instrument(skip(state), err)]
async fn delete_target(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path((project, target)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    project_in_path(&project)?;
    target_in_path(&target)?;

    state
        .credentials
        .delete_target(&project, &target)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    tracing::info!("target deleted");
    Ok(Json(serde_json::json!({})))
}
