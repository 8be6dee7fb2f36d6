//! Orchestration Boot (§4.8): wires every repository, queue, worker, and
//! realtime listener into one `AppDeps` + `Router`, once per process. Event
//! bus subscriber registration is marker-deduplicated so a second call is
//! harmless, but job runners are plain background tasks — the caller (the
//! binary in `bin/server.rs`) is expected to call this exactly once.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::domains::auth::JwtVerifier;
use crate::domains::status::{MatchJobStatus, ParseStatus};
use crate::domains::workers::{self, COMPUTE_MATCH, PARSE_JOB, PARSE_RESUME};
use crate::kernel::deps::AppDeps;
use crate::kernel::event_bus::{DomainEvent, EventBus};
use crate::kernel::jobs::{JobQueue, JobRegistry, JobRunner, JobRunnerConfig, PostgresJobQueue, TypedJobQueue};
use crate::kernel::nlp_client::HttpNlpClient;
use crate::kernel::realtime::RealtimeHub;
use crate::kernel::storage::HttpObjectStorage;
use crate::kernel::traits::{BaseNlpClient, BaseObjectStorage};
use crate::server::app::{build_app, AppState};

pub struct Orchestration {
    pub router: axum::Router,
    pub runner_handles: Vec<JoinHandle<()>>,
}

/// Connects to Postgres, retrying with a fixed backoff (§6.6
/// `SQL_RETRY_ATTEMPTS`/`SQL_RETRY_BACKOFF_MS`) since the database container
/// is frequently still starting up when this process is.
async fn connect_with_retry(config: &Config) -> Result<PgPool> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match PgPoolOptions::new()
            .max_connections(config.sql_pool_max)
            .acquire_timeout(config.sql_connect_timeout)
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < config.sql_retry_attempts => {
                tracing::warn!(attempt, error = %e, "database connect failed, retrying");
                tokio::time::sleep(config.sql_retry_backoff).await;
            }
            Err(e) => return Err(e).context("failed to connect to database"),
        }
    }
}

/// Re-reads the authoritative résumé row joined with the owning user's
/// external subject and pushes a `resume:update` (§4.5) into that user's
/// realtime room. The event bus payload only signals "something changed" —
/// `status`/`createdAt`/`updatedAt` always come from the row, never from the
/// bus event, so a late-arriving or reordered event can't push stale data.
async fn push_resume_update(id: Uuid, pool: &PgPool, realtime: &RealtimeHub) {
    let row: std::result::Result<Option<(ParseStatus, DateTime<Utc>, DateTime<Utc>, String)>, sqlx::Error> =
        sqlx::query_as(
            "SELECT r.status, r.created_at, r.updated_at, u.external_subject \
             FROM resumes r JOIN users u ON u.id = r.user_id WHERE r.id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await;
    let Ok(Some((status, created_at, updated_at, subject))) = row else { return };

    realtime.publish(
        &RealtimeHub::room_for_subject(&subject),
        serde_json::json!({
            "type": "resume:update",
            "id": id,
            "status": status,
            "createdAt": created_at,
            "updatedAt": updated_at,
        }),
    );
}

/// Same as `push_resume_update` for job descriptions; `job:update` also
/// carries `title` (§4.5).
async fn push_job_update(id: Uuid, pool: &PgPool, realtime: &RealtimeHub) {
    let row: std::result::Result<
        Option<(String, ParseStatus, DateTime<Utc>, DateTime<Utc>, String)>,
        sqlx::Error,
    > = sqlx::query_as(
        "SELECT j.title, j.status, j.created_at, j.updated_at, u.external_subject \
         FROM job_descriptions j JOIN users u ON u.id = j.user_id WHERE j.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await;
    let Ok(Some((title, status, created_at, updated_at, subject))) = row else { return };

    realtime.publish(
        &RealtimeHub::room_for_subject(&subject),
        serde_json::json!({
            "type": "job:update",
            "id": id,
            "title": title,
            "status": status,
            "createdAt": created_at,
            "updatedAt": updated_at,
        }),
    );
}

/// Same as `push_resume_update` for match jobs; `match:update` carries no
/// extra fields beyond the common schema (§4.5).
async fn push_match_update(id: Uuid, pool: &PgPool, realtime: &RealtimeHub) {
    let row: std::result::Result<Option<(MatchJobStatus, DateTime<Utc>, DateTime<Utc>, String)>, sqlx::Error> =
        sqlx::query_as(
            "SELECT m.status, m.created_at, m.updated_at, u.external_subject \
             FROM match_jobs m JOIN users u ON u.id = m.user_id WHERE m.id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await;
    let Ok(Some((status, created_at, updated_at, subject))) = row else { return };

    realtime.publish(
        &RealtimeHub::room_for_subject(&subject),
        serde_json::json!({
            "type": "match:update",
            "id": id,
            "status": status,
            "createdAt": created_at,
            "updatedAt": updated_at,
        }),
    );
}

fn register_event_bridges(event_bus: &EventBus, pool: PgPool, realtime: Arc<RealtimeHub>) {
    let p = pool.clone();
    let r = realtime.clone();
    event_bus.subscribe(DomainEvent::RESUME_STATUS_CHANGED, "resume_realtime_bridge", move |event| {
        let pool = p.clone();
        let realtime = r.clone();
        tokio::spawn(async move { push_resume_update(event.id, &pool, &realtime).await });
    });

    let p = pool.clone();
    let r = realtime.clone();
    event_bus.subscribe(DomainEvent::JOB_STATUS_CHANGED, "job_realtime_bridge", move |event| {
        let pool = p.clone();
        let realtime = r.clone();
        tokio::spawn(async move { push_job_update(event.id, &pool, &realtime).await });
    });

    let p = pool.clone();
    let r = realtime.clone();
    event_bus.subscribe(DomainEvent::MATCH_STATUS_CHANGED, "match_realtime_bridge", move |event| {
        let pool = p.clone();
        let realtime = r.clone();
        tokio::spawn(async move { push_match_update(event.id, &pool, &realtime).await });
    });
}

/// One `JobRunner` per requested instance, all polling the same queue. The
/// per-queue concurrency of §4.4 (`parseResume`/`parseJob` default to 1,
/// `computeMatch` to 2) is expressed purely by how many instances are
/// spawned here — the queue itself is shared.
fn spawn_queue(
    deps: Arc<AppDeps>,
    registry: Arc<JobRegistry>,
    job_type: &'static str,
    worker_prefix: &str,
    instances: usize,
    handles: &mut Vec<JoinHandle<()>>,
) {
    for i in 0..instances {
        let queue: Arc<dyn JobQueue> = Arc::new(TypedJobQueue::new(deps.job_queue.clone(), job_type));
        let config = JobRunnerConfig::new(format!("{worker_prefix}-{i}"), 10);
        let runner = JobRunner::new(queue, registry.clone(), deps.clone(), config);
        handles.push(tokio::spawn(async move {
            if let Err(e) = runner.run().await {
                tracing::error!(error = %e, job_type, "job runner exited");
            }
        }));
    }
}

/// NLP collaborator timeouts. §6.6 doesn't expose dedicated env vars for
/// these, so fixed defaults stand in (parsing/matching calls are expected
/// to complete well within a minute).
const NLP_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const NLP_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Wires every dependency and returns the HTTP router plus the background
/// job-runner task handles.
pub async fn boot(config: &Config) -> Result<Orchestration> {
    let pool = connect_with_retry(config).await?;

    sqlx::migrate!("./migrations").run(&pool).await.context("failed to run database migrations")?;

    let object_storage: Arc<dyn BaseObjectStorage> = Arc::new(HttpObjectStorage::new(
        config.r2_endpoint.clone().unwrap_or_default(),
        config.r2_bucket.clone().unwrap_or_default(),
        config.r2_access_key_id.clone().unwrap_or_default(),
        config.r2_secret_access_key.clone().unwrap_or_default(),
    ));

    let nlp_client: Arc<dyn BaseNlpClient> = Arc::new(
        HttpNlpClient::new(&config.nlp_service_url, NLP_CONNECT_TIMEOUT, NLP_REQUEST_TIMEOUT)
            .context("failed to build NLP client")?,
    );

    let event_bus = Arc::new(EventBus::new());
    let realtime = Arc::new(RealtimeHub::default());
    let job_queue = Arc::new(PostgresJobQueue::new(pool.clone()));

    register_event_bridges(&event_bus, pool.clone(), realtime.clone());

    let deps = Arc::new(AppDeps { db_pool: pool, object_storage, nlp_client, event_bus, realtime, job_queue });

    let mut registry = JobRegistry::new();
    registry.register::<workers::ParseResumeCommand, _, _>(PARSE_RESUME, workers::parse_resume);
    registry.register::<workers::ParseJobCommand, _, _>(PARSE_JOB, workers::parse_job);
    registry.register::<workers::ComputeMatchCommand, _, _>(COMPUTE_MATCH, workers::compute_match);
    let registry = Arc::new(registry);

    let mut runner_handles = Vec::new();
    spawn_queue(deps.clone(), registry.clone(), PARSE_RESUME, "parse-resume", 1, &mut runner_handles);
    spawn_queue(deps.clone(), registry.clone(), PARSE_JOB, "parse-job", 1, &mut runner_handles);
    spawn_queue(deps.clone(), registry.clone(), COMPUTE_MATCH, "compute-match", 2, &mut runner_handles);

    let jwt_verifier = Arc::new(JwtVerifier::new(
        config.auth0_domain.clone(),
        config.auth0_audience.clone(),
        config.auth0_issuer_base_url.clone(),
        config.auth_disabled,
    ));

    let state = AppState::new(deps, jwt_verifier);
    let router = build_app(state, &[]);

    Ok(Orchestration { router, runner_handles })
}
