use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt, stream};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use super::{LogStream, RunPhase, Submission, WorkflowEngine, WorkflowError, WorkflowStatus};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const LOG_CONTAINER: &str = "main";

/// Map an Argo workflow phase onto the run lifecycle.
pub fn phase_of(phase: &str) -> RunPhase {
    match phase {
        "Running" => RunPhase::Running,
        "Succeeded" => RunPhase::Success,
        "Failed" | "Error" => RunPhase::Failed,
        _ => RunPhase::Pending,
    }
}

/// Run names are Kubernetes object names; anything else cannot exist and is
/// never interpolated into a request path.
fn is_run_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

fn template_kind(from: &str) -> Result<(&'static str, &str), WorkflowError> {
    match from.split_once('/') {
        Some(("workflowtemplate", name)) if !name.is_empty() => Ok(("WorkflowTemplate", name)),
        Some(("clusterworkflowtemplate", name)) if !name.is_empty() => {
            Ok(("ClusterWorkflowTemplate", name))
        }
        _ => Err(WorkflowError::Other(anyhow::anyhow!(
            "unsupported submission source: {from}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Metadata {
    name: String,
    #[serde(rename = "creationTimestamp", default)]
    creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct RunState {
    #[serde(default)]
    phase: String,
    #[serde(rename = "finishedAt", default)]
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Workflow {
    metadata: Metadata,
    #[serde(default)]
    status: RunState,
}

#[derive(Debug, Deserialize)]
struct WorkflowList {
    #[serde(default)]
    items: Option<Vec<Workflow>>,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(default)]
    result: Option<LogResult>,
    #[serde(default)]
    error: Option<LogFailure>,
}

#[derive(Debug, Deserialize)]
struct LogResult {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct LogFailure {
    #[serde(default)]
    message: String,
}

/// Decode one line of Argo's newline-delimited log response. Blank lines and
/// entries without content yield `None`.
fn parse_log_line(line: &str) -> Result<Option<String>, WorkflowError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let entry: LogEntry = serde_json::from_str(line)
        .map_err(|e| WorkflowError::Other(anyhow::anyhow!("malformed log entry: {e}")))?;
    if let Some(failure) = entry.error {
        return Err(WorkflowError::Engine {
            status: 500,
            message: failure.message,
        });
    }
    Ok(entry.result.map(|r| r.content))
}

async fn check(resp: Response, name: Option<&str>) -> Result<Response, WorkflowError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::NOT_FOUND
        && let Some(name) = name
    {
        return Err(WorkflowError::NotFound(name.to_owned()));
    }
    let message = resp.text().await.unwrap_or_default();
    Err(WorkflowError::Engine {
        status: status.as_u16(),
        message,
    })
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Workflow engine backed by the Argo Workflows server REST API.
pub struct ArgoEngine {
    client: reqwest::Client,
    base: String,
    namespace: String,
    token: Option<String>,
}

impl ArgoEngine {
    pub fn new(addr: &str, namespace: &str, token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base: format!("{}/api/v1/workflows/{namespace}", addr.trim_end_matches('/')),
            namespace: namespace.to_owned(),
            token,
        })
    }

    fn get(&self, url: String) -> RequestBuilder {
        self.authorize(self.client.get(url))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn log_url(&self, name: &str, follow: bool) -> String {
        let mut url = format!(
            "{}/{name}/log?logOptions.container={LOG_CONTAINER}",
            self.base
        );
        if follow {
            url.push_str("&logOptions.follow=true");
        }
        url
    }
}

#[async_trait]
impl WorkflowEngine for ArgoEngine {
    #[tracing::instrument(skip(self, submission), fields(from = %submission.from), err)]
    async fn submit(&self, submission: &Submission) -> Result<String, WorkflowError> {
        let (kind, template) = template_kind(&submission.from)?;
        let parameters: Vec<String> = submission
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let labels = submission
            .labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");

        let body = serde_json::json!({
            "namespace": self.namespace,
            "resourceKind": kind,
            "resourceName": template,
            "submitOptions": {
                "parameters": parameters,
                "labels": labels,
            },
        });
        let resp = self
            .authorize(self.client.post(format!("{}/submit", self.base)))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let workflow: Workflow = check(resp, None).await?.json().await?;

        tracing::info!(workflow = %workflow.metadata.name, "workflow submitted");
        Ok(workflow.metadata.name)
    }

    async fn status(&self, name: &str) -> Result<WorkflowStatus, WorkflowError> {
        if !is_run_name(name) {
            return Err(WorkflowError::NotFound(name.to_owned()));
        }
        let resp = self
            .get(format!("{}/{name}", self.base))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let workflow: Workflow = check(resp, Some(name)).await?.json().await?;

        Ok(WorkflowStatus {
            name: workflow.metadata.name,
            status: phase_of(&workflow.status.phase),
            created: workflow.metadata.creation_timestamp,
            finished: workflow.status.finished_at,
        })
    }

    async fn logs(&self, name: &str) -> Result<Vec<String>, WorkflowError> {
        if !is_run_name(name) {
            return Err(WorkflowError::NotFound(name.to_owned()));
        }
        let resp = self
            .get(self.log_url(name, false))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let body = check(resp, Some(name)).await?.text().await?;

        let mut lines = Vec::new();
        for line in body.lines() {
            if let Some(content) = parse_log_line(line)? {
                lines.push(content);
            }
        }
        Ok(lines)
    }

    async fn log_stream(&self, name: &str) -> Result<LogStream, WorkflowError> {
        if !is_run_name(name) {
            return Err(WorkflowError::NotFound(name.to_owned()));
        }
        let resp = self.get(self.log_url(name, true)).send().await?;
        let resp = check(resp, Some(name)).await?;

        let body = Box::pin(resp.bytes_stream().map_err(std::io::Error::other));
        let lines = StreamReader::new(body).lines();

        let relay = stream::try_unfold(lines, |mut lines| async move {
            loop {
                let Some(line) = lines
                    .next_line()
                    .await
                    .map_err(|e| WorkflowError::Other(e.into()))?
                else {
                    return Ok::<_, WorkflowError>(None);
                };
                if let Some(content) = parse_log_line(&line)? {
                    return Ok(Some((Bytes::from(content + "\n"), lines)));
                }
            }
        });
        Ok(relay.boxed())
    }

    async fn list(&self) -> Result<Vec<String>, WorkflowError> {
        let resp = self
            .get(format!("{}?fields=items.metadata.name", self.base))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let list: WorkflowList = check(resp, None).await?.json().await?;

        Ok(list
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|w| w.metadata.name)
            .collect())
    }
}
