//! Durable job queue infrastructure: the Queue Gateway and Worker Pool of
//! §4.4. Business logic (the parse/match algorithms) lives in `domains::*`;
//! this module only claims, dispatches, and retries.

pub mod job;
pub mod queue;
pub mod registry;
pub mod runner;

pub use job::{ErrorKind, Job, JobPriority, JobStatus};
pub use queue::{ClaimedJob, CommandMeta, EnqueueResult, JobQueue, PostgresJobQueue, TypedJobQueue};
pub use registry::{JobRegistry, SharedJobRegistry};
pub use runner::{JobRunner, JobRunnerConfig};
