//! Workflow engine boundary: submission, status, logs and listing of runs.
//!
//! Runs are owned by the engine and only observed here, never persisted.

pub mod argo;
pub mod error;
pub mod request;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use error::WorkflowError;
pub use request::WorkflowRequest;

/// Live log relay. Dropping the stream releases the upstream connection.
pub type LogStream = BoxStream<'static, Result<Bytes, WorkflowError>>;

/// What the engine is asked to run: a template reference plus string
/// parameters and labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub from: String,
    pub parameters: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStatus {
    pub name: String,
    pub status: RunPhase,
    pub created: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Submit a run and return the engine-assigned name.
    async fn submit(&self, submission: &Submission) -> Result<String, WorkflowError>;

    async fn status(&self, name: &str) -> Result<WorkflowStatus, WorkflowError>;

    async fn logs(&self, name: &str) -> Result<Vec<String>, WorkflowError>;

    /// Follow the run's log until it ends or the returned stream is dropped.
    async fn log_stream(&self, name: &str) -> Result<LogStream, WorkflowError>;

    async fn list(&self) -> Result<Vec<String>, WorkflowError>;
}
