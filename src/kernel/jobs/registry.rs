//! Maps `job_type` strings to typed handlers so a `JobRunner` can claim rows
//! from the database and dispatch them without knowing the concrete command
//! type (the teacher's `JobRegistry` pattern, generalized to this core's
//! `AppDeps`).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;

use super::queue::{ClaimedJob, CommandMeta};
use crate::kernel::deps::AppDeps;

type BoxedHandler = Box<
    dyn Fn(serde_json::Value, Arc<AppDeps>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

struct JobRegistration {
    handler: BoxedHandler,
}

#[derive(Default)]
pub struct JobRegistry {
    registrations: HashMap<&'static str, JobRegistration>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self { registrations: HashMap::new() }
    }

    pub fn register<J, F, Fut>(&mut self, job_type: &'static str, handler: F)
    where
        J: CommandMeta + DeserializeOwned + Send + Sync + 'static,
        F: Fn(J, Arc<AppDeps>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |value, deps| {
            let handler = handler.clone();
            Box::pin(async move {
                let job: J = serde_json::from_value(value)
                    .map_err(|e| anyhow!("failed to deserialize {job_type}: {e}"))?;
                handler(job, deps).await
            })
        });
        self.registrations.insert(job_type, JobRegistration { handler: boxed });
    }

    pub async fn execute(&self, job: &ClaimedJob, deps: Arc<AppDeps>) -> Result<()> {
        let job_type = job.command_type();
        let registration = self
            .registrations
            .get(job_type)
            .ok_or_else(|| anyhow!("unknown job type: {job_type}"))?;
        let args = job
            .job
            .args
            .clone()
            .ok_or_else(|| anyhow!("job {} has no args", job.id))?;
        (registration.handler)(args, deps).await
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.registrations.contains_key(job_type)
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        self.registrations.keys().copied().collect()
    }
}

pub type SharedJobRegistry = Arc<JobRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TestJob {
        name: String,
    }

    impl CommandMeta for TestJob {
        fn command_type(&self) -> &'static str {
            "test_job"
        }
    }

    #[test]
    fn register_and_check() {
        let mut registry = JobRegistry::new();
        registry.register::<TestJob, _, _>("test_job", |_job, _deps| async move { Ok(()) });
        assert!(registry.is_registered("test_job"));
        assert!(!registry.is_registered("unknown_job"));
        assert!(registry.registered_types().contains(&"test_job"));
    }
}
