//! The `jobs` table row and the `FOR UPDATE SKIP LOCKED` claim query.
//!
//! A single table backs all three queues (`parse_resume`, `parse_job`,
//! `compute_match`); `job_type` discriminates which handler the registry
//! dispatches to. Jobs are simple one-shot FIFO work items — there is no
//! recurring schedule, workflow grouping, or dedupe key, unlike the richer
//! scheduler this module is adapted from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    DeadLetter,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "int2")]
pub enum JobPriority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

impl JobPriority {
    pub fn as_i16(&self) -> i16 {
        *self as i16
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

/// Whether a worker failure should be retried (§7 `NLPFailure` / `TransientStorage`)
/// or dead-lettered immediately (§7 `InvalidInput` reaching a worker in error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ErrorKind {
    Retryable,
    NonRetryable,
}

impl ErrorKind {
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub args: Option<serde_json::Value>,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub reference_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

const JOB_COLUMNS: &str = "id, job_type, args, status, priority, reference_id, idempotency_key, \
     retry_count, max_retries, created_at, updated_at, lease_expires_at, worker_id, \
     error_message, error_kind";

impl Job {
    /// Build a new pending job row for a command. Does not persist.
    pub fn for_command(
        job_type: &str,
        args: serde_json::Value,
        reference_id: Option<Uuid>,
        idempotency_key: Option<String>,
        priority: JobPriority,
        max_retries: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            job_type: job_type.to_string(),
            args: Some(args),
            status: JobStatus::Pending,
            priority,
            reference_id,
            idempotency_key,
            retry_count: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            lease_expires_at: None,
            worker_id: None,
            error_message: None,
            error_kind: None,
        }
    }

    /// Clone this job as a fresh pending retry.
    ///
    /// `mark_failed` inserts the retry as a brand-new row rather than
    /// resetting this one in place, so `created_at` on the surviving row
    /// always reflects the original enqueue time.
    pub fn create_retry(&self) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            job_type: self.job_type.clone(),
            args: self.args.clone(),
            status: JobStatus::Pending,
            priority: self.priority,
            reference_id: self.reference_id,
            idempotency_key: None,
            retry_count: self.retry_count + 1,
            max_retries: self.max_retries,
            created_at: now,
            updated_at: now,
            lease_expires_at: None,
            worker_id: None,
            error_message: None,
            error_kind: None,
        }
    }

    pub async fn insert(&self, pool: &sqlx::PgPool) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs ({cols}) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15) \
             RETURNING {cols}",
            cols = JOB_COLUMNS
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(self.id)
            .bind(&self.job_type)
            .bind(&self.args)
            .bind(self.status)
            .bind(self.priority)
            .bind(self.reference_id)
            .bind(&self.idempotency_key)
            .bind(self.retry_count)
            .bind(self.max_retries)
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.lease_expires_at)
            .bind(&self.worker_id)
            .bind(&self.error_message)
            .bind(self.error_kind)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(id: Uuid, pool: &sqlx::PgPool) -> Result<Self, sqlx::Error> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query).bind(id).fetch_one(pool).await
    }

    pub async fn find_by_idempotency_key(
        key: &str,
        pool: &sqlx::PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE idempotency_key = $1 \
             AND status IN ('pending', 'running') LIMIT 1"
        );
        sqlx::query_as::<_, Job>(&query).bind(key).fetch_optional(pool).await
    }

    /// Atomically claim up to `limit` jobs that are pending or whose lease has
    /// expired (a worker died mid-processing), using `FOR UPDATE SKIP LOCKED`
    /// so concurrent workers never double-claim the same row.
    pub async fn claim_jobs(
        job_type: &str,
        limit: i64,
        worker_id: &str,
        lease_ms: i64,
        pool: &sqlx::PgPool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "WITH next_jobs AS ( \
                 SELECT id FROM jobs \
                 WHERE job_type = $1 \
                   AND ( \
                     (status = 'pending' AND retry_count <= max_retries) \
                     OR (status = 'running' AND lease_expires_at < NOW()) \
                   ) \
                 ORDER BY priority, created_at \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE jobs SET status = 'running', \
                 lease_expires_at = NOW() + ($3 || ' milliseconds')::INTERVAL, \
                 worker_id = $4, updated_at = NOW() \
             WHERE id IN (SELECT id FROM next_jobs) \
             RETURNING {JOB_COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job_type)
            .bind(limit)
            .bind(lease_ms.to_string())
            .bind(worker_id)
            .fetch_all(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_command_starts_pending_with_zero_retries() {
        let job = Job::for_command(
            "parse_resume",
            serde_json::json!({"resumeId": "x"}),
            None,
            None,
            JobPriority::Normal,
            3,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
    }

    #[test]
    fn create_retry_increments_count_and_is_pending() {
        let job = Job::for_command(
            "parse_job",
            serde_json::json!({}),
            None,
            Some("idem-1".to_string()),
            JobPriority::Normal,
            3,
        );
        let retry = job.create_retry();
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.status, JobStatus::Pending);
        assert_ne!(retry.id, job.id);
        assert!(retry.idempotency_key.is_none());
    }

    #[test]
    fn error_kind_should_retry() {
        assert!(ErrorKind::Retryable.should_retry());
        assert!(!ErrorKind::NonRetryable.should_retry());
    }
}
