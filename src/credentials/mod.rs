//! Secrets-and-policy engine boundary.
//!
//! The engine is the source of truth for which projects and targets exist.
//! [`vault::VaultProvider`] is the production adapter.

pub mod error;
pub mod target;
pub mod vault;

use async_trait::async_trait;
use serde::Serialize;

pub use error::CredentialsError;
pub use target::{CredentialType, Target, TargetPatch, TargetProperties, TargetType};

/// Credential handed to a tenant when its project is provisioned. The token
/// is what the tenant later presents as its user-role secret.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectCredentials {
    pub token: String,
    pub token_accessor: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: String,
}

/// Projects a validated user token may act on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenScope {
    pub projects: Vec<String>,
}

impl TokenScope {
    pub fn allows(&self, project: &str) -> bool {
        self.projects.iter().any(|p| p == project)
    }
}

#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Resolve a user secret to the projects it is scoped to. Tokens that are
    /// unknown, expired, or not bound to any project yield `InvalidToken`.
    async fn validate_user_token(&self, token: &str) -> Result<TokenScope, CredentialsError>;

    async fn project_exists(&self, project: &str) -> Result<bool, CredentialsError>;

    /// Provision the project's namespace and issue its credential.
    async fn create_project(&self, project: &str) -> Result<ProjectCredentials, CredentialsError>;

    async fn get_project(&self, project: &str) -> Result<ProjectInfo, CredentialsError>;

    async fn delete_project(&self, project: &str) -> Result<(), CredentialsError>;

    /// Target names owned by `project`, sorted. `NotFound` when the project
    /// itself is absent; an empty list when it simply has no targets.
    async fn list_targets(&self, project: &str) -> Result<Vec<String>, CredentialsError>;

    async fn target_exists(&self, project: &str, target: &str) -> Result<bool, CredentialsError>;

    async fn get_target(&self, project: &str, target: &str) -> Result<Target, CredentialsError>;

    async fn create_target(&self, project: &str, target: &Target) -> Result<(), CredentialsError>;

    /// Overwrite the stored target with `target`.
    async fn update_target(&self, project: &str, target: &Target) -> Result<(), CredentialsError>;

    async fn delete_target(&self, project: &str, target: &str) -> Result<(), CredentialsError>;
}
