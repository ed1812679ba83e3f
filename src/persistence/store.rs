//! SQLite-based run result store

use crate::core::{ExecutionStatus, PipelineContext};
use crate::persistence::{PersistenceBackend, RunMetadata, StoredRun};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const SELECT_RUNS: &str = r#"
    SELECT id, pipeline_name, status, started_at, completed_at,
           completed_steps, skipped_steps, total_steps, error, context
    FROM runs
"#;

/// SQLite run store: metadata columns plus the JSON context snapshot
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("podcast-pipeline");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        let db_path = db_dir.join("runs.db");
        Self::new(&db_path.to_string_lossy()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                completed_steps INTEGER NOT NULL DEFAULT 0,
                skipped_steps INTEGER NOT NULL DEFAULT 0,
                total_steps INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                context TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_runs_pipeline_name ON runs(pipeline_name);
            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn status_to_str(status: ExecutionStatus) -> &'static str {
        match status {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    fn status_from_str(status: &str) -> Result<ExecutionStatus> {
        Ok(match status {
            "pending" => ExecutionStatus::Pending,
            "running" => ExecutionStatus::Running,
            "completed" => ExecutionStatus::Completed,
            "failed" => ExecutionStatus::Failed,
            other => anyhow::bail!("Unknown run status '{}'", other),
        })
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn from_row(row: &SqliteRow) -> Result<StoredRun> {
        let context: PipelineContext = serde_json::from_str(&row.get::<String, _>("context"))
            .context("Corrupt context snapshot")?;

        Ok(StoredRun {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            metadata: RunMetadata {
                pipeline_name: row.get("pipeline_name"),
                status: Self::status_from_str(&row.get::<String, _>("status"))?,
                started_at: Self::from_naive(row.get("started_at")),
                completed_at: row
                    .get::<Option<NaiveDateTime>, _>("completed_at")
                    .map(Self::from_naive),
                completed_steps: row.get::<i64, _>("completed_steps") as usize,
                skipped_steps: row.get::<i64, _>("skipped_steps") as usize,
                total_steps: row.get::<i64, _>("total_steps") as usize,
                error: row.get("error"),
            },
            context,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run_result(
        &self,
        run_id: Uuid,
        context: &PipelineContext,
        metadata: &RunMetadata,
    ) -> Result<()> {
        let snapshot = serde_json::to_string(context).context("Failed to encode context")?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, status, started_at, completed_at,
             completed_steps, skipped_steps, total_steps, error, context)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(run_id.to_string())
        .bind(&metadata.pipeline_name)
        .bind(Self::status_to_str(metadata.status))
        .bind(Self::to_naive(metadata.started_at))
        .bind(metadata.completed_at.map(Self::to_naive))
        .bind(metadata.completed_steps as i64)
        .bind(metadata.skipped_steps as i64)
        .bind(metadata.total_steps as i64)
        .bind(&metadata.error)
        .bind(snapshot)
        .execute(&self.pool)
        .await
        .context("Failed to save run result")?;

        Ok(())
    }

    async fn load_run_result(&self, run_id: Uuid) -> Result<Option<StoredRun>> {
        let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_RUNS))
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run result")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<StoredRun>> {
        let rows = sqlx::query(&format!(
            "{} WHERE pipeline_name = ?1 ORDER BY started_at DESC",
            SELECT_RUNS
        ))
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM runs
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}
