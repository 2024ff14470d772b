//! Manifest retrieval from version control.

pub mod error;
pub mod fetcher;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ApiError;
use crate::validation;

pub use error::ManifestError;
pub use fetcher::GitCliFetcher;

/// Location of a manifest file at a fixed commit.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ManifestRef {
    pub repository: String,
    pub commit_hash: String,
    pub path: String,
}

impl ManifestRef {
    pub fn validate(&self) -> Result<(), ApiError> {
        validation::check_repository(&self.repository)?;
        validation::check_commit_hash(&self.commit_hash)?;
        validation::check_repo_path(&self.path)?;
        Ok(())
    }
}

#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    /// Raw bytes of `path` as of `commit_hash` in `repository`.
    async fn fetch(&self, manifest: &ManifestRef) -> Result<Vec<u8>, ManifestError>;
}
