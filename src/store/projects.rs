use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Durable record written alongside a provisioned project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEntry {
    pub project: String,
    pub repository: Option<String>,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create_project_entry(&self, entry: &ProjectEntry) -> anyhow::Result<()>;

    async fn delete_project_entry(&self, project: &str) -> anyhow::Result<()>;
}

pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and bring the schema up to date.
    #[tracing::instrument(skip(url), err)]
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .context("failed to connect to postgres")?;
        tracing::info!("connected to postgres");

        sqlx::migrate!().run(&pool).await?;
        tracing::info!("migrations applied");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl MetadataStore for PgProjectStore {
    async fn create_project_entry(&self, entry: &ProjectEntry) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO projects (project, repository) VALUES ($1, $2)")
            .bind(&entry.project)
            .bind(entry.repository.as_deref())
            .execute(&self.pool)
            .await
            .with_context(|| format!("insert project entry {}", entry.project))?;
        Ok(())
    }

    async fn delete_project_entry(&self, project: &str) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM projects WHERE project = $1")
            .bind(project)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete project entry {project}"))?;
        if result.rows_affected() == 0 {
            tracing::warn!(%project, "no metadata entry to delete");
        }
        Ok(())
    }
}
