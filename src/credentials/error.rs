use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("token is not a valid project token")]
    InvalidToken,

    #[error("secrets engine returned {status}: {message}")]
    Engine { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<CredentialsError> for ApiError {
    fn from(err: CredentialsError) -> Self {
        match err {
            CredentialsError::NotFound(what) => Self::NotFound(what.into()),
            CredentialsError::InvalidToken => Self::Unauthorized,
            CredentialsError::Engine { .. }
            | CredentialsError::Http(_)
            | CredentialsError::Other(_) => Self::Internal(err.into()),
        }
    }
}
