//! SQLite Job Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::DbPool;
use crate::application::ports::{
    JobConfig, JobFilter, JobLogEntry, JobRecord, JobRepositoryPort, JobStatus, JobUpdate,
    RepositoryError,
};
use crate::domain::content::Stage;

/// SQLite Job Repository
pub struct SqliteJobRepository {
    pool: DbPool,
}

impl SqliteJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(e.to_string())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::SerializationError(e.to_string()))
}

fn parse_stage(value: Option<String>) -> Result<Option<Stage>, RepositoryError> {
    value
        .map(|s| {
            Stage::from_str(&s)
                .ok_or_else(|| RepositoryError::SerializationError(format!("unknown stage '{}'", s)))
        })
        .transpose()
}

const JOB_COLUMNS: &str = "job_id, project_id, status, current_stage, completed_stage, \
     progress_percent, started_at, completed_at, error_message, config, created_at";

#[derive(FromRow)]
struct JobRow {
    job_id: String,
    project_id: String,
    status: String,
    current_stage: Option<String>,
    completed_stage: Option<String>,
    progress_percent: i64,
    started_at: Option<String>,
    completed_at: Option<String>,
    error_message: Option<String>,
    config: String,
    created_at: String,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = RepositoryError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let config: JobConfig = serde_json::from_str(&row.config)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
        Ok(JobRecord {
            status: JobStatus::from_str(&row.status).ok_or_else(|| {
                RepositoryError::SerializationError(format!("unknown job status '{}'", row.status))
            })?,
            job_id: row.job_id,
            project_id: row.project_id,
            current_stage: parse_stage(row.current_stage)?,
            completed_stage: parse_stage(row.completed_stage)?,
            progress_percent: row.progress_percent.clamp(0, 100) as u8,
            started_at: row.started_at.as_deref().map(parse_time).transpose()?,
            completed_at: row.completed_at.as_deref().map(parse_time).transpose()?,
            error_message: row.error_message,
            config,
            created_at: parse_time(&row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct LogRow {
    timestamp: String,
    line: String,
}

#[async_trait]
impl JobRepositoryPort for SqliteJobRepository {
    async fn create(&self, job: &JobRecord) -> Result<(), RepositoryError> {
        let config = serde_json::to_string(&job.config)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (job_id, project_id, status, current_stage, completed_stage,
                              progress_percent, started_at, completed_at, error_message,
                              config, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.project_id)
        .bind(job.status.as_str())
        .bind(job.current_stage.map(|s| s.as_str()))
        .bind(job.completed_stage.map(|s| s.as_str()))
        .bind(job.progress_percent as i64)
        .bind(job.started_at.map(|t| t.to_rfc3339()))
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .bind(&job.error_message)
        .bind(config)
        .bind(job.created_at.to_rfc3339())
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RepositoryError::Duplicate(job.job_id.clone()))
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn find_by_id(&self, job_id: &str) -> Result<Option<JobRecord>, RepositoryError> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {} FROM jobs WHERE job_id = ?", JOB_COLUMNS))
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn update(&self, job_id: &str, update: &JobUpdate) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let status = update.status.map(|s| s.as_str());
        let terminal = update.status.map(|s| s.is_terminal()).unwrap_or(false);

        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = COALESCE(?, status),
                current_stage = COALESCE(?, current_stage),
                completed_stage = COALESCE(?, completed_stage),
                progress_percent = COALESCE(?, progress_percent),
                error_message = COALESCE(?, error_message),
                started_at = CASE WHEN ? = 'running' AND started_at IS NULL THEN ? ELSE started_at END,
                completed_at = CASE WHEN ? THEN ? ELSE completed_at END,
                updated_at = ?
            WHERE job_id = ?
            "#,
        )
        .bind(status)
        .bind(update.current_stage.map(|s| s.as_str()))
        .bind(update.completed_stage.map(|s| s.as_str()))
        .bind(update.progress_percent.map(|p| p as i64))
        .bind(&update.error_message)
        .bind(status)
        .bind(&now)
        .bind(terminal)
        .bind(&now)
        .bind(&now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(job_id.to_string()));
        }

        if let Some(status) = update.status {
            tracing::debug!(job_id = %job_id, status = status.as_str(), "Job status updated");
        }
        Ok(())
    }

    async fn append_log(&self, job_id: &str, line: &str) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO job_logs (job_id, timestamp, line) VALUES (?, ?, ?)")
            .bind(job_id)
            .bind(Utc::now().to_rfc3339())
            .bind(line)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn tail_logs(&self, job_id: &str, limit: u32) -> Result<Vec<JobLogEntry>, RepositoryError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT timestamp, line FROM (
                SELECT id, timestamp, line FROM job_logs
                WHERE job_id = ?
                ORDER BY id DESC
                LIMIT ?
            ) ORDER BY id ASC
            "#,
        )
        .bind(job_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(JobLogEntry {
                    timestamp: parse_time(&row.timestamp)?,
                    line: row.line,
                })
            })
            .collect()
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, RepositoryError> {
        let status = filter.status.map(|s| s.as_str());
        // SQLite 中 LIMIT -1 表示不限制
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);

        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM jobs \
             WHERE (? IS NULL OR status = ?) AND (? IS NULL OR project_id = ?) \
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(status)
        .bind(status)
        .bind(&filter.project_id)
        .bind(&filter.project_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }

    async fn delete(&self, job_id: &str) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("DELETE FROM job_logs WHERE job_id = ?")
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let result = sqlx::query("DELETE FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(job_id.to_string()));
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }
}
