use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::TryStreamExt;
use serde::Serialize;

use crate::api::helpers::JsonBody;
use crate::auth::{AuthContext, UserAuth};
use crate::error::ApiError;
use crate::git::ManifestRef;
use crate::store::AppState;
use crate::validation;
use crate::workflow::{WorkflowRequest, WorkflowStatus};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct WorkflowCreated {
    pub workflow_name: String,
}

#[derive(Debug, Serialize)]
pub struct WorkflowLogs {
    pub logs: Vec<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workflows", post(create_workflow))
        .route("/workflows/{name}", get(get_workflow))
        .route("/workflows/{name}/logs", get(get_workflow_logs))
        .route("/workflows/{name}/logstream", get(stream_workflow_logs))
        .route(
            "/projects/{project}/targets/{target}/operations",
            post(create_workflow_from_manifest),
        )
        .route(
            "/projects/{project}/targets/{target}/workflows",
            get(list_workflows),
        )
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Existence and scope checks for the project/target pair a run binds to.
/// A missing project is reported before the caller's scope is consulted.
async fn check_binding(
    state: &AppState,
    ctx: &AuthContext,
    project: &str,
    target: &str,
) -> Result<(), ApiError> {
    if !state.credentials.project_exists(project).await? {
        return Err(ApiError::BadRequest("project does not exist".into()));
    }
    ctx.require_user_scope(project)?;
    if !state.credentials.target_exists(project, target).await? {
        return Err(ApiError::BadRequest("target does not exist".into()));
    }
    Ok(())
}

async fn submit(
    state: &AppState,
    request: WorkflowRequest,
) -> Result<Json<WorkflowCreated>, ApiError> {
    let submission = request.into_submission(&state.config.workflows)?;
    let workflow_name = state.workflows.submit(&submission).await?;

    tracing::info!(%workflow_name, "workflow submitted");
    Ok(Json(WorkflowCreated { workflow_name }))
}

#[tracing::instrument(
    skip(state, ctx, request),
    fields(project = %request.project_name, target = %request.target_name),
    err
)]
async fn create_workflow(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    JsonBody(request): JsonBody<WorkflowRequest>,
) -> Result<Json<WorkflowCreated>, ApiError> {
    request.validate(&state.config.workflows)?;
    check_binding(&state, &ctx, &request.project_name, &request.target_name).await?;
    submit(&state, request).await
}

#[tracing::instrument(skip(state, ctx, manifest), fields(commit = %manifest.commit_hash), err)]
async fn create_workflow_from_manifest(
    State(state): State<AppState>,
    UserAuth(ctx): UserAuth,
    Path((project, target)): Path<(String, String)>,
    JsonBody(manifest): JsonBody<ManifestRef>,
) -> Result<Json<WorkflowCreated>, ApiError> {
    manifest.validate()?;
    validation::check_project_name(&project)?;
    validation::check_target_name(&target)?;
    check_binding(&state, &ctx, &project, &target).await?;

    let bytes = state.manifests.fetch(&manifest).await?;
    let request = WorkflowRequest::from_manifest(&bytes, &project, &target)?;
    request.validate(&state.config.workflows)?;
    submit(&state, request).await
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

async fn get_workflow(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(name): Path<String>,
) -> Result<Json<WorkflowStatus>, ApiError> {
    Ok(Json(state.workflows.status(&name).await?))
}

async fn get_workflow_logs(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(name): Path<String>,
) -> Result<Json<WorkflowLogs>, ApiError> {
    let logs = state.workflows.logs(&name).await?;
    Ok(Json(WorkflowLogs { logs }))
}

/// Relay the engine's follow-mode log as a chunked plain-text body. When the
/// client goes away the body, and with it the upstream stream, is dropped.
async fn stream_workflow_logs(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let stream = state.workflows.log_stream(&name).await?;
    let stream = stream.inspect_err(move |e| {
        tracing::warn!(workflow = %name, error = %e, "log stream ended with error");
    });

    Ok((
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn list_workflows(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.workflows.list().await?))
}
