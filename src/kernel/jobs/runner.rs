//! Polls a single queue, dispatches claimed jobs via the registry, and
//! updates their status. Retries are handled entirely by `JobQueue::mark_failed`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::ErrorKind;
use super::queue::JobQueue;
use super::registry::SharedJobRegistry;
use crate::kernel::deps::AppDeps;

#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub worker_id: String,
}

impl JobRunnerConfig {
    pub fn new(worker_id: impl Into<String>, batch_size: i64) -> Self {
        Self {
            batch_size,
            poll_interval: Duration::from_secs(5),
            worker_id: worker_id.into(),
        }
    }
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            worker_id: format!("runner-{}", Uuid::new_v4()),
        }
    }
}

/// One instance per queue (`parseResume`, `parseJob`, `computeMatch`); the
/// per-queue concurrency setting from §4.4 is expressed by how many
/// `JobRunner`s for the same queue the orchestration boot spawns.
pub struct JobRunner {
    job_queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    deps: Arc<AppDeps>,
    config: JobRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<AppDeps>,
        config: JobRunnerConfig,
    ) -> Self {
        Self { job_queue, registry, deps, config, shutdown: Arc::new(AtomicBool::new(false)) }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            queue = self.job_queue.job_type(),
            batch_size = self.config.batch_size,
            "job runner starting"
        );

        loop {
            if self.is_shutdown_requested() {
                break;
            }

            let jobs = match self.job_queue.claim(&self.config.worker_id, self.config.batch_size).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, queue = self.job_queue.job_type(), "failed to claim jobs");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            debug!(count = jobs.len(), queue = self.job_queue.job_type(), "claimed jobs");

            for job in jobs {
                if self.is_shutdown_requested() {
                    break;
                }

                let job_id = job.id;
                let job_type = job.command_type().to_string();
                debug!(job_id = %job_id, job_type = %job_type, "executing job");

                let result = self.registry.execute(&job, self.deps.clone()).await;

                match result {
                    Ok(()) => {
                        info!(job_id = %job_id, job_type = %job_type, "job succeeded");
                        if let Err(e) = self.job_queue.mark_succeeded(job_id).await {
                            error!(job_id = %job_id, error = %e, "failed to mark job as succeeded");
                        }
                    }
                    Err(e) => {
                        warn!(job_id = %job_id, job_type = %job_type, error = %e, "job failed");
                        let kind = classify_error(&e);
                        if let Err(mark_err) = self.job_queue.mark_failed(job_id, &e.to_string(), kind).await {
                            error!(job_id = %job_id, error = %mark_err, "failed to mark job as failed");
                        }
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "job runner stopped");
        Ok(())
    }
}

/// Heuristic split between transient failures (retry) and permanent ones
/// (dead-letter immediately) — grounded on the teacher's `classify_error`.
fn classify_error(error: &anyhow::Error) -> ErrorKind {
    let s = error.to_string().to_lowercase();
    if s.contains("not found")
        || s.contains("invalid")
        || s.contains("permission denied")
        || s.contains("unauthorized")
        || s.contains("forbidden")
        || s.contains("deserialize")
        || s.contains("parse")
    {
        return ErrorKind::NonRetryable;
    }
    ErrorKind::Retryable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_error_retryable() {
        let error = anyhow::anyhow!("connection timeout");
        assert_eq!(classify_error(&error), ErrorKind::Retryable);
    }

    #[test]
    fn classify_error_not_found() {
        let error = anyhow::anyhow!("resume not found");
        assert_eq!(classify_error(&error), ErrorKind::NonRetryable);
    }

    #[test]
    fn classify_error_deserialize() {
        let error = anyhow::anyhow!("failed to deserialize payload");
        assert_eq!(classify_error(&error), ErrorKind::NonRetryable);
    }
}
