//! `AppDeps` bundles every infrastructure dependency the domains and job
//! handlers need, following the teacher's `ServerDeps`/`ServerKernel`
//! pattern: infrastructure only, injected as `Arc<dyn Trait>` so tests can
//! swap in fakes.

use std::sync::Arc;
use sqlx::PgPool;

use crate::kernel::event_bus::EventBus;
use crate::kernel::jobs::PostgresJobQueue;
use crate::kernel::realtime::SharedRealtimeHub;
use crate::kernel::traits::{BaseNlpClient, BaseObjectStorage};

pub struct AppDeps {
    pub db_pool: PgPool,
    pub object_storage: Arc<dyn BaseObjectStorage>,
    pub nlp_client: Arc<dyn BaseNlpClient>,
    pub event_bus: Arc<EventBus>,
    pub realtime: SharedRealtimeHub,
    /// The single broker connection shared by every queue and the
    /// ingestion controllers that enqueue work onto it (§5 "shared
    /// resources").
    pub job_queue: Arc<PostgresJobQueue>,
}
