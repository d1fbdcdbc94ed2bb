//! Postgres-backed job store.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{Executor, FromRow};
use tracing::{debug, warn};
use vnote_models::{JobId, JobStatus, JobUpdate, VideoJob};

use crate::error::{StoreError, StoreResult};
use crate::metrics::{record_conflict, record_operation};
use crate::{DbConfig, JobStore};

/// Table layout. Applied by [`PgJobStore::ensure_schema`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS video_jobs (
    id               TEXT PRIMARY KEY,
    owner_id         TEXT NOT NULL,
    filename         VARCHAR(255) NOT NULL,
    status           TEXT NOT NULL,
    source_reference TEXT NOT NULL,
    audio_reference  TEXT,
    transcript       TEXT,
    summary          TEXT,
    error            TEXT,
    created_at       TIMESTAMPTZ NOT NULL,
    updated_at       TIMESTAMPTZ NOT NULL,
    version          BIGINT NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS video_jobs_owner_created_idx
    ON video_jobs (owner_id, created_at DESC);
"#;

const COLUMNS: &str = "id, owner_id, filename, status, source_reference, audio_reference, \
                       transcript, summary, error, created_at, updated_at, version";

#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    owner_id: String,
    filename: String,
    status: String,
    source_reference: String,
    audio_reference: Option<String>,
    transcript: Option<String>,
    summary: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<JobRow> for VideoJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::invalid_row(format!("job {}: {}", row.id, e)))?;
        Ok(VideoJob {
            id: JobId::from_string(row.id),
            owner_id: row.owner_id,
            filename: row.filename,
            status,
            source_reference: row.source_reference,
            audio_reference: row.audio_reference,
            transcript: row.transcript,
            summary: row.summary,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

/// Job store backed by a `video_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `DATABASE_URL` and friends.
    pub async fn from_env() -> StoreResult<Self> {
        let config = DbConfig::from_env()?;
        Ok(Self::new(config.connect().await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the table if it does not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        self.pool.execute(SCHEMA).await?;
        Ok(())
    }

    async fn exists(&self, id: &JobId) -> StoreResult<bool> {
        let found: Option<(String,)> = sqlx::query_as("SELECT id FROM video_jobs WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn insert(&self, job: &VideoJob) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO video_jobs (id, owner_id, filename, status, source_reference, \
             audio_reference, transcript, summary, error, created_at, updated_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(job.id.as_str())
        .bind(&job.owner_id)
        .bind(&job.filename)
        .bind(job.status.as_str())
        .bind(&job.source_reference)
        .bind(&job.audio_reference)
        .bind(&job.transcript)
        .bind(&job.summary)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.version)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::AlreadyExists(job.id.clone())
            }
            _ => StoreError::from(e),
        })?;
        Ok(())
    }

    async fn select(&self, id: &JobId) -> StoreResult<Option<VideoJob>> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {} FROM video_jobs WHERE id = $1", COLUMNS))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        row.map(VideoJob::try_from).transpose()
    }

    async fn guarded_update(&self, job: &mut VideoJob, update: &JobUpdate) -> StoreResult<()> {
        let sql = format!(
            "UPDATE video_jobs SET \
               status = $3, \
               audio_reference = COALESCE(audio_reference, $4), \
               transcript = COALESCE($5, transcript), \
               summary = COALESCE($6, summary), \
               error = CASE WHEN $7::TEXT IS NOT NULL THEN $7 WHEN $8 THEN NULL ELSE error END, \
               updated_at = NOW(), \
               version = version + 1 \
             WHERE id = $1 AND version = $2 \
             RETURNING {}",
            COLUMNS
        );

        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(job.id.as_str())
            .bind(job.version)
            .bind(update.status.as_str())
            .bind(&update.audio_reference)
            .bind(&update.transcript)
            .bind(&update.summary)
            .bind(&update.error)
            .bind(update.clear_error)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                *job = VideoJob::try_from(row)?;
                debug!(job_id = %job.id, status = %job.status, version = job.version, "Committed job update");
                Ok(())
            }
            None if self.exists(&job.id).await? => {
                record_conflict();
                warn!(job_id = %job.id, expected_version = job.version, "Job commit lost version race");
                Err(StoreError::Conflict {
                    job_id: job.id.clone(),
                    expected_version: job.version,
                })
            }
            None => Err(StoreError::NotFound(job.id.clone())),
        }
    }

    async fn reset(&self, id: &JobId) -> StoreResult<VideoJob> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE video_jobs SET status = $2, error = NULL, updated_at = NOW(), \
             version = version + 1 WHERE id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(id.as_str())
        .bind(JobStatus::Queued.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => VideoJob::try_from(row),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn remove(&self, id: &JobId) -> StoreResult<bool> {
        let done = sqlx::query("DELETE FROM video_jobs WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn select_by_owner(&self, owner_id: &str) -> StoreResult<Vec<VideoJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM video_jobs WHERE owner_id = $1 ORDER BY created_at DESC",
            COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(VideoJob::try_from).collect()
    }
}

fn timed<T>(operation: &'static str, started: Instant, result: &StoreResult<T>) {
    record_operation(
        operation,
        result.is_ok(),
        started.elapsed().as_secs_f64() * 1000.0,
    );
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &VideoJob) -> StoreResult<()> {
        let started = Instant::now();
        let result = self.insert(job).await;
        timed("create", started, &result);
        result
    }

    async fn load(&self, id: &JobId) -> StoreResult<Option<VideoJob>> {
        let started = Instant::now();
        let result = self.select(id).await;
        timed("load", started, &result);
        result
    }

    async fn commit(&self, job: &mut VideoJob, update: JobUpdate) -> StoreResult<()> {
        let started = Instant::now();
        let result = self.guarded_update(job, &update).await;
        timed("commit", started, &result);
        result
    }

    async fn reset_for_regeneration(&self, id: &JobId) -> StoreResult<VideoJob> {
        let started = Instant::now();
        let result = self.reset(id).await;
        timed("reset", started, &result);
        result
    }

    async fn delete(&self, id: &JobId) -> StoreResult<bool> {
        let started = Instant::now();
        let result = self.remove(id).await;
        timed("delete", started, &result);
        result
    }

    async fn list_by_owner(&self, owner_id: &str) -> StoreResult<Vec<VideoJob>> {
        let started = Instant::now();
        let result = self.select_by_owner(owner_id).await;
        timed("list", started, &result);
        result
    }
}
