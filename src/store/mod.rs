pub mod projects;

use std::sync::Arc;

use crate::config::Config;
use crate::credentials::CredentialsProvider;
use crate::git::ManifestFetcher;
use crate::workflow::WorkflowEngine;

pub use projects::{MetadataStore, PgProjectStore, ProjectEntry};

/// Per-process handles shared by every request. Collaborators are trait
/// objects so tests can swap in deterministic doubles.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<dyn CredentialsProvider>,
    pub metadata: Arc<dyn MetadataStore>,
    pub workflows: Arc<dyn WorkflowEngine>,
    pub manifests: Arc<dyn ManifestFetcher>,
    /// Client for probes that bypass the collaborator adapters.
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}
