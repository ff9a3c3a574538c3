//! Job store on Postgres: insert, claim, and guarded status updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::job::*;
use crate::store::JobStore;

const JOB_COLUMNS: &str = "id, job_type, payload, status, retries, max_retries, error, run_after, created_at, updated_at, completed_at";

#[async_trait]
impl JobStore for super::Db {
    async fn insert_job(&self, new: NewJob, default_max_retries: u32) -> Result<Job> {
        let job = Job::from_new(new, default_max_retries, Utc::now());
        let max_retries = int_column("max_retries", job.max_retries)?;
        let sql = format!(
            "INSERT INTO jobs (id, job_type, payload, status, retries, max_retries, run_after, created_at, updated_at)
             VALUES ($1, $2, $3, 'PENDING', 0, $4, $5, $5, $5)
             RETURNING {JOB_COLUMNS}"
        );
        let row: JobRow = sqlx::query_as(&sql)
            .bind(job.id.0)
            .bind(&job.job_type)
            .bind(&job.payload)
            .bind(max_retries)
            .bind(job.created_at)
            .fetch_one(self.pool())
            .await?;
        row.try_into_job()
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_optional(self.pool())
            .await?;
        row.ok_or_else(|| Error::NotFound(format!("job {id}")))?
            .try_into_job()
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        // Select-and-mark in one statement; SKIP LOCKED keeps a stray second
        // engine from claiming the same row.
        let sql = format!(
            "UPDATE jobs SET status = 'PROCESSING', updated_at = $1
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'PENDING' AND run_after <= $1
                 ORDER BY created_at, seq
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        );
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(now)
            .fetch_optional(self.pool())
            .await?;

        row.map(JobRow::try_into_job).transpose()
    }

    async fn complete_job(&self, id: JobId) -> Result<Job> {
        validate_transition(JobStatus::Processing, JobStatus::Completed)?;
        let sql = format!(
            "UPDATE jobs SET status = 'COMPLETED', updated_at = now(), completed_at = now()
             WHERE id = $1 AND status = 'PROCESSING'
             RETURNING {JOB_COLUMNS}"
        );
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_optional(self.pool())
            .await?;
        let row = row.ok_or_else(|| Error::InvalidTransition {
            from: "not PROCESSING".to_string(),
            to: JobStatus::Completed.to_string(),
        })?;
        row.try_into_job()
    }

    async fn retry_job(&self, id: JobId, error: &str, run_after: DateTime<Utc>) -> Result<Job> {
        validate_transition(JobStatus::Processing, JobStatus::Pending)?;
        let sql = format!(
            "UPDATE jobs SET status = 'PENDING', retries = retries + 1, error = $1, run_after = $2, updated_at = now()
             WHERE id = $3 AND status = 'PROCESSING' AND retries < max_retries
             RETURNING {JOB_COLUMNS}"
        );
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(error)
            .bind(run_after)
            .bind(id.0)
            .fetch_optional(self.pool())
            .await?;
        let row = row.ok_or_else(|| Error::InvalidTransition {
            from: "not PROCESSING or out of retries".to_string(),
            to: JobStatus::Pending.to_string(),
        })?;
        row.try_into_job()
    }

    async fn fail_job(&self, id: JobId, error: &str) -> Result<Job> {
        validate_transition(JobStatus::Processing, JobStatus::Failed)?;
        let sql = format!(
            "UPDATE jobs SET status = 'FAILED', error = $1, updated_at = now(), completed_at = now()
             WHERE id = $2 AND status = 'PROCESSING'
             RETURNING {JOB_COLUMNS}"
        );
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(error)
            .bind(id.0)
            .fetch_optional(self.pool())
            .await?;
        let row = row.ok_or_else(|| Error::InvalidTransition {
            from: "not PROCESSING".to_string(),
            to: JobStatus::Failed.to_string(),
        })?;
        row.try_into_job()
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE ($1::text IS NULL OR status = $1)
             AND ($2::text IS NULL OR job_type = $2)
             ORDER BY created_at, seq
             LIMIT $3"
        );
        let rows: Vec<JobRow> = sqlx::query_as(&sql)
            .bind(filter.status.map(JobStatus::as_str))
            .bind(filter.job_type.as_deref())
            .bind(filter.limit.unwrap_or(100))
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(JobRow::try_into_job).collect()
    }
}

/// Convert a count to its INTEGER column, refusing values that would wrap.
fn int_column(column: &str, n: u32) -> Result<i32> {
    i32::try_from(n).map_err(|_| Error::Other(format!("{column} {n} exceeds {}", i32::MAX)))
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    payload: serde_json::Value,
    status: String,
    retries: i32,
    max_retries: i32,
    error: Option<String>,
    run_after: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn try_into_job(self) -> Result<Job> {
        Ok(Job {
            id: JobId(self.id),
            job_type: self.job_type,
            payload: self.payload,
            status: self.status.parse()?,
            retries: self.retries.max(0) as u32,
            max_retries: self.max_retries.max(0) as u32,
            error: self.error,
            run_after: self.run_after,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}
