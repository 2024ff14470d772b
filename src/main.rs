use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cello::config::Config;
use cello::credentials::vault::VaultProvider;
use cello::git::GitCliFetcher;
use cello::store::{AppState, PgProjectStore};
use cello::workflow::argo::ArgoEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("CELLO_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().json())
        .init();

    let cfg = Config::load()?;
    if cfg.admin_secret.is_empty() {
        tracing::warn!("CELLO_ADMIN_SECRET is not set; admin endpoints will reject every request");
    }

    let metadata = PgProjectStore::connect(&cfg.database_url).await?;
    let credentials = VaultProvider::new(&cfg.vault_addr, &cfg.vault_token)?;
    let workflows = ArgoEngine::new(&cfg.argo_addr, &cfg.argo_namespace, cfg.argo_token.clone())?;
    let manifests = GitCliFetcher::new(cfg.git_workdir.clone());
    tracing::info!(
        vault = %cfg.vault_addr,
        argo = %cfg.argo_addr,
        namespace = %cfg.argo_namespace,
        frameworks = ?cfg.workflows.frameworks().collect::<Vec<_>>(),
        "collaborators configured"
    );

    let addr: SocketAddr = cfg.listen.parse()?;
    let state = AppState {
        credentials: Arc::new(credentials),
        metadata: Arc::new(metadata),
        workflows: Arc::new(workflows),
        manifests: Arc::new(manifests),
        http: reqwest::Client::new(),
        config: Arc::new(cfg),
    };

    let app = cello::app(state);

    tracing::info!(%addr, "starting cello");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("cello stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
