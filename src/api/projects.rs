use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::helpers::{JsonBody, project_in_path};
use crate::auth::AdminAuth;
use crate::credentials::{ProjectCredentials, ProjectInfo};
use crate::error::ApiError;
use crate::store::{AppState, ProjectEntry};
use crate::validation;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub repository: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project))
        .route("/projects/{project}", get(get_project).delete(delete_project))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Provision the project in the secrets engine, then record it in the
/// metadata store. A failed store write leaves the engine side in place.
#[tracing::instrument(skip(state, body), fields(project = %body.name), err)]
async fn create_project(
    State(state): State<AppState>,
    _admin: AdminAuth,
    JsonBody(body): JsonBody<CreateProjectRequest>,
) -> Result<Json<ProjectCredentials>, ApiError> {
    validation::check_project_name(&body.name)?;
    if let Some(repository) = &body.repository {
        validation::check_repository(repository)?;
    }

    if state.credentials.project_exists(&body.name).await? {
        return Err(ApiError::Conflict("project already exists".into()));
    }

    let credentials = state.credentials.create_project(&body.name).await?;

    let entry = ProjectEntry {
        project: body.name.clone(),
        repository: body.repository,
    };
    state
        .metadata
        .create_project_entry(&entry)
        .await
        .map_err(|e| {
            ApiError::Internal(e.context("project provisioned but metadata entry not written"))
        })?;

    tracing::info!("project created");
    Ok(Json(credentials))
}

async fn get_project(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(project): Path<String>,
) -> Result<Json<ProjectInfo>, ApiError> {
    project_in_path(&project)?;
    Ok(Json(state.credentials.get_project(&project).await?))
}

/// Refused while the project still owns targets. The engine side is removed
/// first; a failed metadata delete afterwards is not rolled back.
#[tracing::instrument(skip(state), err)]
async fn delete_project(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(project): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    project_in_path(&project)?;

    let targets = state.credentials.list_targets(&project).await?;
    if !targets.is_empty() {
        return Err(ApiError::Conflict(format!(
            "project has {} existing target(s)",
            targets.len()
        )));
    }

    state
        .credentials
        .delete_project(&project)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    state
        .metadata
        .delete_project_entry(&project)
        .await
        .map_err(|e| {
            ApiError::Internal(e.context("project removed but metadata entry not deleted"))
        })?;

    tracing::info!("project deleted");
    Ok(Json(serde_json::json!({})))
}
