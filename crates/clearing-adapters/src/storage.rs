use crate::mirror::{InMemoryNarrativeMirror, TracingNarrativeMirror};
use async_trait::async_trait;
use clearing_core::collaborators::NarrativeMirror;
use clearing_core::error::CollaboratorError;
use clearing_core::narrative::NarrativeRecord;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::info;

/// Narrative mirror backend configuration.
#[derive(Debug, Clone, Default)]
pub enum MirrorStorageConfig {
    /// Keep records in process memory only.
    #[default]
    Memory,
    /// Write records to the log stream.
    Tracing,
    /// Insert records into PostgreSQL.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl MirrorStorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn tracing() -> Self {
        Self::Tracing
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Tracing => "tracing",
            Self::Postgres { .. } => "postgres",
        }
    }

    /// Build the configured mirror. Postgres connects and creates its table first.
    pub async fn build(&self) -> Result<Arc<dyn NarrativeMirror>, CollaboratorError> {
        let mirror: Arc<dyn NarrativeMirror> = match self {
            Self::Memory => Arc::new(InMemoryNarrativeMirror::new()),
            Self::Tracing => Arc::new(TracingNarrativeMirror),
            Self::Postgres {
                database_url,
                max_connections,
            } => Arc::new(PostgresNarrativeMirror::connect(database_url, *max_connections).await?),
        };
        info!(backend = self.label(), "narrative mirror ready");
        Ok(mirror)
    }
}

/// Append-only narrative table in PostgreSQL.
///
/// Re-delivered records are ignored on `record_id` conflict.
#[derive(Debug, Clone)]
pub struct PostgresNarrativeMirror {
    pool: PgPool,
}

impl PostgresNarrativeMirror {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CollaboratorError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("postgres connect failed: {e}")))?;

        let mirror = Self { pool };
        mirror.ensure_schema().await?;
        Ok(mirror)
    }

    async fn ensure_schema(&self) -> Result<(), CollaboratorError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS narrative_records (
                record_id TEXT PRIMARY KEY,
                recorded_at TIMESTAMPTZ NOT NULL,
                kind TEXT NOT NULL,
                digest TEXT NOT NULL,
                body JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CollaboratorError::Unavailable(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_narrative_records_kind ON narrative_records (kind, recorded_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CollaboratorError::Unavailable(format!("postgres index create failed: {e}")))?;

        Ok(())
    }

    pub async fn count(&self) -> Result<i64, CollaboratorError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM narrative_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("postgres count failed: {e}")))?;
        row.try_get("total")
            .map_err(|e| CollaboratorError::Unavailable(format!("postgres decode total failed: {e}")))
    }
}

#[async_trait]
impl NarrativeMirror for PostgresNarrativeMirror {
    async fn record(&self, record: NarrativeRecord) -> Result<(), CollaboratorError> {
        let body = serde_json::to_value(&record.body)
            .map_err(|e| CollaboratorError::Rejected(format!("unserializable record: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO narrative_records (record_id, recorded_at, kind, digest, body)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (record_id) DO NOTHING
            "#,
        )
        .bind(&record.record_id)
        .bind(record.recorded_at)
        .bind(record.body.kind())
        .bind(&record.digest)
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(|e| CollaboratorError::Unavailable(format!("postgres insert failed: {e}")))?;

        Ok(())
    }
}
