//! PostgreSQL-backed job queue: the durable FIFO broker behind `parseResume`,
//! `parseJob`, and `computeMatch` (§4.4).

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::job::{ErrorKind, Job, JobPriority};

/// Result of an enqueue call, distinguishing a fresh row from an
/// idempotency-key hit on an already-pending/running job.
#[derive(Debug, Clone, Copy)]
pub enum EnqueueResult {
    Created(Uuid),
    Duplicate(Uuid),
}

impl EnqueueResult {
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

#[derive(Debug)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job: Job,
}

impl ClaimedJob {
    pub fn deserialize<C: serde::de::DeserializeOwned>(&self) -> Result<C> {
        let args = self
            .job
            .args
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("job {} has no args", self.id))?;
        serde_json::from_value(args.clone())
            .map_err(|e| anyhow::anyhow!("failed to deserialize job {}: {e}", self.id))
    }

    pub fn command_type(&self) -> &str {
        &self.job.job_type
    }
}

/// Metadata every queued command provides, mirroring the shape the queue
/// needs to build a row without the caller reaching into `Job` directly.
pub trait CommandMeta {
    fn command_type(&self) -> &'static str;

    fn idempotency_key(&self) -> Option<String> {
        None
    }

    fn priority(&self) -> JobPriority {
        JobPriority::Normal
    }

    fn reference_id(&self) -> Option<Uuid> {
        None
    }

    fn max_retries(&self) -> i32 {
        3
    }
}

/// A single PostgreSQL table (`jobs`) drives all three of the core's queues,
/// discriminated by `job_type`. Each queue-specific client below binds
/// `job_type` so callers never have to pass it explicitly.
pub struct PostgresJobQueue {
    pool: PgPool,
    default_lease_ms: i64,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, default_lease_ms: 60_000 }
    }

    pub fn with_lease_duration(pool: PgPool, lease_ms: i64) -> Self {
        Self { pool, default_lease_ms: lease_ms }
    }

    pub async fn enqueue<C>(&self, command: &C) -> Result<EnqueueResult>
    where
        C: serde::Serialize + CommandMeta,
    {
        if let Some(key) = command.idempotency_key() {
            if let Some(existing) = Job::find_by_idempotency_key(&key, &self.pool).await? {
                return Ok(EnqueueResult::Duplicate(existing.id));
            }
        }

        let args = serde_json::to_value(command)?;
        let job = Job::for_command(
            command.command_type(),
            args,
            command.reference_id(),
            command.idempotency_key(),
            command.priority(),
            command.max_retries(),
        );
        let inserted = job.insert(&self.pool).await?;
        Ok(EnqueueResult::Created(inserted.id))
    }

    /// Claim up to `limit` jobs of the given type for this worker.
    pub async fn claim(&self, job_type: &str, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        let jobs = Job::claim_jobs(job_type, limit, worker_id, self.default_lease_ms, &self.pool).await?;
        Ok(jobs.into_iter().map(|job| ClaimedJob { id: job.id, job }).collect())
    }

    pub async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'succeeded', updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a job as failed. If the error is retryable and attempts remain,
    /// inserts a new row scheduled via exponential backoff (`2^retry_count`
    /// seconds, capped at one hour) rather than reusing this row, per the
    /// queue's at-least-once delivery contract.
    pub async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        let job = Job::find_by_id(job_id, &self.pool).await?;

        if kind.should_retry() && job.retry_count < job.max_retries {
            let delay_secs = 2i64.pow(job.retry_count as u32).min(3600);
            tracing::info!(job_id = %job_id, delay_secs, "scheduling retry");
            let retry = job.create_retry();
            retry.insert(&self.pool).await?;

            sqlx::query(
                "UPDATE jobs SET status = 'failed', error_message = $1, error_kind = $2, \
                 updated_at = NOW() WHERE id = $3",
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        } else {
            tracing::warn!(job_id = %job_id, "retries exhausted, dead-lettering");
            sqlx::query(
                "UPDATE jobs SET status = 'dead_letter', error_message = $1, error_kind = $2, \
                 updated_at = NOW() WHERE id = $3",
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn heartbeat(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL, \
             updated_at = NOW() WHERE id = $2 AND status = 'running'",
        )
        .bind(self.default_lease_ms.to_string())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// A queue is simply the underlying table scoped to one `job_type`, so a
/// single `PostgresJobQueue` can back several `JobRunner`s with different
/// concurrency settings (§4.4: parsers default to 1, match defaults to 2).
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>>;
    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;
    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()>;
}

/// Binds a `PostgresJobQueue` to one `job_type` string.
pub struct TypedJobQueue {
    inner: std::sync::Arc<PostgresJobQueue>,
    job_type: &'static str,
}

impl TypedJobQueue {
    pub fn new(inner: std::sync::Arc<PostgresJobQueue>, job_type: &'static str) -> Self {
        Self { inner, job_type }
    }
}

#[async_trait]
impl JobQueue for TypedJobQueue {
    fn job_type(&self) -> &'static str {
        self.job_type
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        self.inner.claim(self.job_type, worker_id, limit).await
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        self.inner.mark_succeeded(job_id).await
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        self.inner.mark_failed(job_id, error, kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_result_helpers() {
        let created = EnqueueResult::Created(Uuid::new_v4());
        assert!(created.is_created());
        let duplicate = EnqueueResult::Duplicate(Uuid::new_v4());
        assert!(!duplicate.is_created());
        assert_eq!(created.job_id(), created.job_id());
    }
}
