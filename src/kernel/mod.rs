//! Kernel: core infrastructure with dependency injection.
//!
//! The kernel is for INFRASTRUCTURE only — business logic belongs in
//! `domains::*`. `AppDeps` bundles the pieces every domain and job handler
//! needs; the traits in `traits` pin the contracts of everything §1
//! excludes from the core.

pub mod deps;
pub mod event_bus;
pub mod jobs;
pub mod nlp_client;
pub mod realtime;
pub mod storage;
pub mod traits;

pub use deps::AppDeps;
pub use event_bus::{DomainEvent, EventBus};
pub use realtime::RealtimeHub;
pub use traits::{BaseNlpClient, BaseObjectStorage};
