use std::time::Duration;

use reqwest::StatusCode;

/// Upper bound on a single liveness probe, body read included.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe the secrets engine's health endpoint.
///
/// 200 and 429 (standby or throttled) count as alive. A failure reading the
/// body after an accepted status line is logged and ignored.
#[tracing::instrument(skip(client))]
pub async fn probe(client: &reqwest::Client, vault_addr: &str) -> bool {
    let url = format!("{}/v1/sys/health", vault_addr.trim_end_matches('/'));

    let resp = match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(error = %e, "secrets engine unreachable");
            return false;
        }
    };

    let status = resp.status();
    if let Err(e) = resp.bytes().await {
        tracing::warn!(error = %e, %status, "failed to read health response body");
    }

    if matches!(status, StatusCode::OK | StatusCode::TOO_MANY_REQUESTS) {
        true
    } else {
        tracing::warn!(%status, "secrets engine reported unhealthy");
        false
    }
}
