use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Repository, commit or path cannot be resolved.
    #[error("manifest not found: {0}")]
    NotFound(String),

    #[error("manifest fetch failed: {0}")]
    Transport(#[from] anyhow::Error),
}

impl From<ManifestError> for ApiError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::NotFound(detail) => {
                tracing::warn!(%detail, "manifest could not be resolved");
                Self::BadRequest("unable to retrieve manifest".into())
            }
            ManifestError::Transport(e) => Self::Internal(e),
        }
    }
}
