//! The in-process domain event bus (§4.3): typed fan-out of
//! `{resume,job,match}.status.changed`, registered once at boot and
//! delivered synchronously to each subscriber's own async task so one
//! subscriber's failure never blocks another.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three status-changed events of §4.3, each carrying at least
/// `{id, status, ts}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub topic: &'static str,
    pub id: Uuid,
    pub status: String,
    pub ts: DateTime<Utc>,
}

impl DomainEvent {
    pub const RESUME_STATUS_CHANGED: &'static str = "resume.status.changed";
    pub const JOB_STATUS_CHANGED: &'static str = "job.status.changed";
    pub const MATCH_STATUS_CHANGED: &'static str = "match.status.changed";

    pub fn new(topic: &'static str, id: Uuid, status: impl Into<String>) -> Self {
        Self { topic, id, status: status.into(), ts: Utc::now() }
    }
}

type Subscriber = Arc<dyn Fn(DomainEvent) + Send + Sync>;

/// Process-wide singleton constructed once by the orchestration boot.
/// Subscribers are keyed by a string marker so re-running boot is a no-op
/// (§4.8, §9 "event-bus subscribers with deduplication").
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<&'static str, Vec<(&'static str, Subscriber)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for `topic` under `marker`. If `marker` is
    /// already registered for this topic, this call is a no-op.
    pub fn subscribe<F>(&self, topic: &'static str, marker: &'static str, handler: F)
    where
        F: Fn(DomainEvent) + Send + Sync + 'static,
    {
        let mut subscribers = self.subscribers.write().unwrap();
        let entries = subscribers.entry(topic).or_default();
        if entries.iter().any(|(existing_marker, _)| *existing_marker == marker) {
            tracing::debug!(topic, marker, "subscriber already registered, skipping");
            return;
        }
        entries.push((marker, Arc::new(handler)));
    }

    /// Publish an event. Each subscriber runs independently; a subscriber
    /// panicking or erroring must not prevent others from running, so each
    /// is invoked from its own spawned task.
    pub fn publish(&self, event: DomainEvent) {
        let handlers: Vec<Subscriber> = {
            let subscribers = self.subscribers.read().unwrap();
            subscribers
                .get(event.topic)
                .map(|entries| entries.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            let event = event.clone();
            tokio::spawn(async move {
                handler(event);
            });
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.read().unwrap().get(topic).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn duplicate_marker_registration_is_a_no_op() {
        let bus = EventBus::new();
        bus.subscribe(DomainEvent::JOB_STATUS_CHANGED, "job_realtime_bridge", |_| {});
        bus.subscribe(DomainEvent::JOB_STATUS_CHANGED, "job_realtime_bridge", |_| {});
        assert_eq!(bus.subscriber_count(DomainEvent::JOB_STATUS_CHANGED), 1);
    }

    #[tokio::test]
    async fn publish_delivers_to_all_subscribers_independently() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        bus.subscribe(DomainEvent::RESUME_STATUS_CHANGED, "a", move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        bus.subscribe(DomainEvent::RESUME_STATUS_CHANGED, "b", move |_| {
            panic!("subscriber b always fails");
        });
        let c3 = count.clone();
        bus.subscribe(DomainEvent::RESUME_STATUS_CHANGED, "c", move |_| {
            c3.fetch_add(1, Ordering::SeqCst);
        });
        let _ = c2;

        bus.publish(DomainEvent::new(DomainEvent::RESUME_STATUS_CHANGED, Uuid::new_v4(), "ready"));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
