#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceExt;

use cello::config::{Config, WorkflowConfig};
use cello::credentials::{
    CredentialType, CredentialsError, CredentialsProvider, ProjectCredentials, ProjectInfo,
    Target, TargetProperties, TargetType, TokenScope,
};
use cello::git::{ManifestError, ManifestFetcher, ManifestRef};
use cello::store::{AppState, MetadataStore, ProjectEntry};
use cello::workflow::{
    LogStream, RunPhase, Submission, WorkflowEngine, WorkflowError, WorkflowStatus,
};

pub const ADMIN_SECRET: &str = "D34DB33FD34DB33FD34DB33FD34DB33F";
/// User token scoped to `proj1`.
pub const USER_TOKEN: &str = "hvs.proj1-user";

pub fn admin_header() -> String {
    format!("vault:admin:{ADMIN_SECRET}")
}

pub fn user_header() -> String {
    format!("vault:user:{USER_TOKEN}")
}

pub const INVALID_HEADER: &str = "bad auth header";

pub fn sample_target(name: &str) -> Target {
    Target {
        name: name.to_owned(),
        target_type: TargetType::AwsAccount,
        properties: TargetProperties {
            credential_type: CredentialType::AssumedRole,
            role_arn: Some("arn:aws:iam::012345678901:role/test-role".into()),
            policy_arns: vec!["arn:aws:iam::012345678901:policy/test-policy".into()],
            policy_document: Some(
                r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":"s3:ListBuckets","Resource":"*"}]}"#
                    .into(),
            ),
        },
    }
}

// ---------------------------------------------------------------------------
// Credentials provider double
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CredentialsState {
    projects: BTreeMap<String, BTreeMap<String, Target>>,
    tokens: HashMap<String, Vec<String>>,
    undeletable_projects: HashSet<String>,
    undeletable_targets: HashSet<String>,
    mutations: Vec<String>,
    token_lookups: usize,
}

/// In-memory secrets engine. Records every mutating call so tests can assert
/// that rejected requests caused no side effects.
#[derive(Default)]
pub struct FakeCredentials {
    state: Mutex<CredentialsState>,
}

impl FakeCredentials {
    pub fn add_project(&self, project: &str) {
        self.state
            .lock()
            .unwrap()
            .projects
            .entry(project.to_owned())
            .or_default();
    }

    pub fn add_target(&self, project: &str, target: Target) {
        self.state
            .lock()
            .unwrap()
            .projects
            .entry(project.to_owned())
            .or_default()
            .insert(target.name.clone(), target);
    }

    pub fn issue_token(&self, token: &str, projects: &[&str]) {
        self.state.lock().unwrap().tokens.insert(
            token.to_owned(),
            projects.iter().map(|p| (*p).to_owned()).collect(),
        );
    }

    pub fn refuse_project_delete(&self, project: &str) {
        self.state
            .lock()
            .unwrap()
            .undeletable_projects
            .insert(project.to_owned());
    }

    pub fn refuse_target_delete(&self, target: &str) {
        self.state
            .lock()
            .unwrap()
            .undeletable_targets
            .insert(target.to_owned());
    }

    pub fn has_project(&self, project: &str) -> bool {
        self.state.lock().unwrap().projects.contains_key(project)
    }

    pub fn stored_target(&self, project: &str, target: &str) -> Option<Target> {
        self.state
            .lock()
            .unwrap()
            .projects
            .get(project)
            .and_then(|targets| targets.get(target))
            .cloned()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn token_lookups(&self) -> usize {
        self.state.lock().unwrap().token_lookups
    }
}

#[async_trait]
impl CredentialsProvider for FakeCredentials {
    async fn validate_user_token(&self, token: &str) -> Result<TokenScope, CredentialsError> {
        let mut state = self.state.lock().unwrap();
        state.token_lookups += 1;
        match state.tokens.get(token) {
            Some(projects) if !projects.is_empty() => Ok(TokenScope {
                projects: projects.clone(),
            }),
            _ => Err(CredentialsError::InvalidToken),
        }
    }

    async fn project_exists(&self, project: &str) -> Result<bool, CredentialsError> {
        Ok(self.has_project(project))
    }

    async fn create_project(&self, project: &str) -> Result<ProjectCredentials, CredentialsError> {
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("create_project:{project}"));
        state.projects.insert(project.to_owned(), BTreeMap::new());
        let token = format!("hvs.{project}-issued");
        state.tokens.insert(token.clone(), vec![project.to_owned()]);
        Ok(ProjectCredentials {
            token,
            token_accessor: format!("accessor-{project}"),
        })
    }

    async fn get_project(&self, project: &str) -> Result<ProjectInfo, CredentialsError> {
        if self.has_project(project) {
            Ok(ProjectInfo {
                name: project.to_owned(),
            })
        } else {
            Err(CredentialsError::NotFound("project"))
        }
    }

    async fn delete_project(&self, project: &str) -> Result<(), CredentialsError> {
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("delete_project:{project}"));
        if state.undeletable_projects.contains(project) {
            return Err(CredentialsError::Engine {
                status: 500,
                message: "policy in use".into(),
            });
        }
        state.projects.remove(project);
        Ok(())
    }

    async fn list_targets(&self, project: &str) -> Result<Vec<String>, CredentialsError> {
        let state = self.state.lock().unwrap();
        state
            .projects
            .get(project)
            .map(|targets| targets.keys().cloned().collect())
            .ok_or(CredentialsError::NotFound("project"))
    }

    async fn target_exists(&self, project: &str, target: &str) -> Result<bool, CredentialsError> {
        Ok(self.stored_target(project, target).is_some())
    }

    async fn get_target(&self, project: &str, target: &str) -> Result<Target, CredentialsError> {
        self.stored_target(project, target)
            .ok_or(CredentialsError::NotFound("target"))
    }

    async fn create_target(&self, project: &str, target: &Target) -> Result<(), CredentialsError> {
        let mut state = self.state.lock().unwrap();
        state
            .mutations
            .push(format!("create_target:{project}/{}", target.name));
        state
            .projects
            .entry(project.to_owned())
            .or_default()
            .insert(target.name.clone(), target.clone());
        Ok(())
    }

    async fn update_target(&self, project: &str, target: &Target) -> Result<(), CredentialsError> {
        let mut state = self.state.lock().unwrap();
        state
            .mutations
            .push(format!("update_target:{project}/{}", target.name));
        if let Some(targets) = state.projects.get_mut(project) {
            targets.insert(target.name.clone(), target.clone());
        }
        Ok(())
    }

    async fn delete_target(&self, project: &str, target: &str) -> Result<(), CredentialsError> {
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("delete_target:{project}/{target}"));
        if state.undeletable_targets.contains(target) {
            return Err(CredentialsError::Engine {
                status: 400,
                message: "role in use".into(),
            });
        }
        match state.projects.get_mut(project).and_then(|t| t.remove(target)) {
            Some(_) => Ok(()),
            None => Err(CredentialsError::NotFound("target")),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata store double
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeMetadata {
    entries: Mutex<BTreeMap<String, ProjectEntry>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeMetadata {
    /// Make every write for `project` fail.
    pub fn fail_for(&self, project: &str) {
        self.failing.lock().unwrap().insert(project.to_owned());
    }

    pub fn entry(&self, project: &str) -> Option<ProjectEntry> {
        self.entries.lock().unwrap().get(project).cloned()
    }

    fn check(&self, project: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(project) {
            anyhow::bail!("some db error");
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for FakeMetadata {
    async fn create_project_entry(&self, entry: &ProjectEntry) -> anyhow::Result<()> {
        self.check(&entry.project)?;
        self.entries
            .lock()
            .unwrap()
            .insert(entry.project.clone(), entry.clone());
        Ok(())
    }

    async fn delete_project_entry(&self, project: &str) -> anyhow::Result<()> {
        self.check(project)?;
        self.entries.lock().unwrap().remove(project);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Workflow engine double
// ---------------------------------------------------------------------------

pub const KNOWN_RUN: &str = "wf-existing";

#[derive(Default)]
pub struct FakeWorkflows {
    submissions: Mutex<Vec<Submission>>,
    live_log: Mutex<Option<mpsc::Receiver<Result<Bytes, WorkflowError>>>>,
}

impl FakeWorkflows {
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Route the next log stream through a channel the test controls.
    pub fn live_log(&self) -> mpsc::Sender<Result<Bytes, WorkflowError>> {
        let (tx, rx) = mpsc::channel(8);
        *self.live_log.lock().unwrap() = Some(rx);
        tx
    }

    fn known(name: &str) -> Result<(), WorkflowError> {
        if name == KNOWN_RUN {
            Ok(())
        } else {
            Err(WorkflowError::NotFound(name.to_owned()))
        }
    }
}

#[async_trait]
impl WorkflowEngine for FakeWorkflows {
    async fn submit(&self, submission: &Submission) -> Result<String, WorkflowError> {
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(submission.clone());
        Ok(format!("wf-{:06}", submissions.len()))
    }

    async fn status(&self, name: &str) -> Result<WorkflowStatus, WorkflowError> {
        Self::known(name)?;
        Ok(WorkflowStatus {
            name: name.to_owned(),
            status: RunPhase::Success,
            created: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single(),
            finished: Utc.with_ymd_and_hms(2026, 1, 2, 3, 9, 0).single(),
        })
    }

    async fn logs(&self, name: &str) -> Result<Vec<String>, WorkflowError> {
        Self::known(name)?;
        Ok(vec!["cdk diff".into(), "no differences".into()])
    }

    async fn log_stream(&self, name: &str) -> Result<LogStream, WorkflowError> {
        Self::known(name)?;
        if let Some(rx) = self.live_log.lock().unwrap().take() {
            return Ok(ReceiverStream::new(rx).boxed());
        }
        let lines = self
            .logs(name)
            .await?
            .into_iter()
            .map(|line| Ok(Bytes::from(line + "\n")));
        Ok(futures_util::stream::iter(lines).boxed())
    }

    async fn list(&self) -> Result<Vec<String>, WorkflowError> {
        Ok(vec![
            "project1-target1-abcde".into(),
            "project2-target2-12345".into(),
        ])
    }
}

// ---------------------------------------------------------------------------
// Manifest fetcher double
// ---------------------------------------------------------------------------

pub const UNREACHABLE_REPO: &str = "https://git.invalid/unreachable.git";

#[derive(Default)]
pub struct FakeManifests {
    files: Mutex<HashMap<(String, String, String), Vec<u8>>>,
    requested: Mutex<Vec<String>>,
}

impl FakeManifests {
    /// Repositories passed to `fetch`, in call order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    pub fn add(&self, repository: &str, commit: &str, path: &str, content: &str) {
        self.files.lock().unwrap().insert(
            (repository.to_owned(), commit.to_owned(), path.to_owned()),
            content.as_bytes().to_vec(),
        );
    }
}

#[async_trait]
impl ManifestFetcher for FakeManifests {
    async fn fetch(&self, manifest: &ManifestRef) -> Result<Vec<u8>, ManifestError> {
        self.requested
            .lock()
            .unwrap()
            .push(manifest.repository.clone());
        if manifest.repository == UNREACHABLE_REPO {
            return Err(ManifestError::Transport(anyhow::anyhow!("connection timed out")));
        }
        self.files
            .lock()
            .unwrap()
            .get(&(
                manifest.repository.clone(),
                manifest.commit_hash.clone(),
                manifest.path.clone(),
            ))
            .cloned()
            .ok_or_else(|| ManifestError::NotFound("path does not exist".into()))
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub credentials: Arc<FakeCredentials>,
    pub metadata: Arc<FakeMetadata>,
    pub workflows: Arc<FakeWorkflows>,
    pub manifests: Arc<FakeManifests>,
}

pub fn test_config(vault_addr: &str) -> Config {
    Config {
        listen: "127.0.0.1:0".into(),
        admin_secret: ADMIN_SECRET.into(),
        vault_addr: vault_addr.into(),
        vault_token: "service-token".into(),
        argo_addr: "http://127.0.0.1:1".into(),
        argo_namespace: "argo".into(),
        argo_token: None,
        database_url: "postgres://localhost/test".into(),
        git_workdir: std::env::temp_dir().join("cello-test-git"),
        workflows: WorkflowConfig::default(),
    }
}

/// Router over fresh doubles. `USER_TOKEN` is valid for `proj1`.
pub fn test_app() -> TestApp {
    test_app_with_vault("http://127.0.0.1:1")
}

pub fn test_app_with_vault(vault_addr: &str) -> TestApp {
    let credentials = Arc::new(FakeCredentials::default());
    credentials.issue_token(USER_TOKEN, &["proj1"]);
    let metadata = Arc::new(FakeMetadata::default());
    let workflows = Arc::new(FakeWorkflows::default());
    let manifests = Arc::new(FakeManifests::default());

    let state = AppState {
        credentials: credentials.clone(),
        metadata: metadata.clone(),
        workflows: workflows.clone(),
        manifests: manifests.clone(),
        http: reqwest::Client::new(),
        config: Arc::new(test_config(vault_addr)),
    };

    TestApp {
        router: cello::app(state),
        credentials,
        metadata,
        workflows,
        manifests,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

fn request(method: &str, path: &str, auth: &str) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(path);
    if !auth.is_empty() {
        builder = builder.header("Authorization", auth);
    }
    builder
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = body_json(resp).await;
    (status, body)
}

/// Send a GET request with the given authorization header.
pub async fn get_json(app: &Router, auth: &str, path: &str) -> (StatusCode, Value) {
    send(app, request("GET", path, auth).body(Body::empty()).unwrap()).await
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: &Router, auth: &str, path: &str, body: Value) -> (StatusCode, Value) {
    let req = request("POST", path, auth)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();
    send(app, req).await
}

/// Send a POST request with a raw body, for malformed-JSON cases.
pub async fn post_raw(app: &Router, auth: &str, path: &str, body: &str) -> (StatusCode, Value) {
    let req = request("POST", path, auth)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();
    send(app, req).await
}

pub async fn patch_json(app: &Router, auth: &str, path: &str, body: Value) -> (StatusCode, Value) {
    let req = request("PATCH", path, auth)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();
    send(app, req).await
}

pub async fn delete_json(app: &Router, auth: &str, path: &str) -> (StatusCode, Value) {
    send(app, request("DELETE", path, auth).body(Body::empty()).unwrap()).await
}

/// Send a GET request and return the body as text.
pub async fn get_text(app: &Router, auth: &str, path: &str) -> (StatusCode, String) {
    let req = request("GET", path, auth).body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Extract JSON body from a response.
async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
