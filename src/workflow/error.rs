use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow {0} not found")]
    NotFound(String),

    #[error("workflow engine returned {status}: {message}")]
    Engine { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Every engine failure, a missing run included, is a backend error to the
/// caller.
impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        Self::Internal(err.into())
    }
}
