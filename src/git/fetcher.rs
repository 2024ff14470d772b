use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ManifestError, ManifestFetcher, ManifestRef};

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// stderr fragments from a failed connection. Checked first: git follows
/// these with generic "could not read" lines that say nothing about whether
/// the repository exists.
const TRANSPORT_MARKERS: [&str; 6] = [
    "ssh:",
    "Connection refused",
    "Connection timed out",
    "Could not resolve host",
    "unable to access",
    "Host key verification failed",
];

/// stderr fragments git prints when a repository, revision or path does not
/// resolve.
const UNRESOLVED_MARKERS: [&str; 6] = [
    "does not exist",
    "Repository not found",
    "invalid object name",
    "Invalid object name",
    "bad revision",
    "unknown revision",
];

fn is_unresolved(stderr: &str) -> bool {
    if TRANSPORT_MARKERS.iter().any(|m| stderr.contains(m)) {
        return false;
    }
    UNRESOLVED_MARKERS.iter().any(|m| stderr.contains(m)) || names_missing_repository(stderr)
}

/// `fatal: repository '<url>' not found`
fn names_missing_repository(stderr: &str) -> bool {
    stderr.lines().any(|line| {
        line.split_once("repository '")
            .is_some_and(|(_, rest)| rest.ends_with("' not found"))
    })
}

/// Fetches manifests with the `git` CLI: a throwaway bare clone per request,
/// then `git show <commit>:<path>`.
pub struct GitCliFetcher {
    workdir: PathBuf,
    timeout: Duration,
}

impl GitCliFetcher {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: GIT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn git(&self, args: &[&str], step: &str) -> Result<Output, ManifestError> {
        let output = tokio::time::timeout(self.timeout, {
            tokio::process::Command::new("git")
                .args(args)
                .env("GIT_TERMINAL_PROMPT", "0")
                .kill_on_drop(true)
                .output()
        })
        .await
        .map_err(|_| anyhow::anyhow!("git {step} timed out after {:?}", self.timeout))?
        .map_err(|e| anyhow::anyhow!("failed to run git {step}: {e}"))?;

        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if is_unresolved(&stderr) {
            return Err(ManifestError::NotFound(stderr));
        }
        Err(ManifestError::Transport(anyhow::anyhow!(
            "git {step} failed: {stderr}"
        )))
    }

    async fn fetch_into(&self, scratch: &Path, manifest: &ManifestRef) -> Result<Vec<u8>, ManifestError> {
        let scratch = scratch.to_string_lossy();
        self.git(
            &["clone", "--bare", "--quiet", "--", &manifest.repository, &scratch],
            "clone",
        )
        .await?;

        let object = format!("{}:{}", manifest.commit_hash, manifest.path.trim_start_matches('/'));
        let output = self
            .git(&["--git-dir", &scratch, "show", &object], "show")
            .await?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl ManifestFetcher for GitCliFetcher {
    #[tracing::instrument(skip(self), err)]
    async fn fetch(&self, manifest: &ManifestRef) -> Result<Vec<u8>, ManifestError> {
        tokio::fs::create_dir_all(&self.workdir)
            .await
            .map_err(|e| anyhow::anyhow!("failed to create git workdir: {e}"))?;
        let scratch = self.workdir.join(Uuid::new_v4().to_string());

        let result = self.fetch_into(&scratch, manifest).await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(error = %e, path = %scratch.display(), "failed to remove scratch clone");
        }
        result
    }
}
