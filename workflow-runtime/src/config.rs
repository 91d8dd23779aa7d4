//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Settings for the local background scheduler and its workers.
///
/// All fields have defaults, so a partial document deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Identifier reported by background workers in logs.
    pub worker_id: String,
    /// Bound of the in-process job queue.
    pub queue_capacity: usize,
    /// Jobs a single worker runs in parallel.
    pub max_concurrency: NonZeroUsize,
    /// Per-job timeout. `None` leaves timeout policy to the job itself.
    #[serde(with = "optional_millis")]
    pub job_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-1".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_concurrency: NonZeroUsize::MIN,
            job_timeout: None,
        }
    }
}

impl RuntimeConfig {
    /// Read settings from `WORKFLOW_*` environment variables.
    ///
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_id: std::env::var("WORKFLOW_WORKER_ID").unwrap_or(defaults.worker_id),
            queue_capacity: env_parse("WORKFLOW_QUEUE_CAPACITY")
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.queue_capacity),
            max_concurrency: env_parse::<usize>("WORKFLOW_MAX_CONCURRENCY")
                .and_then(NonZeroUsize::new)
                .unwrap_or(defaults.max_concurrency),
            job_timeout: env_parse::<u64>("WORKFLOW_JOB_TIMEOUT_MS")
                .map(Duration::from_millis)
                .or(defaults.job_timeout),
        }
    }

    #[must_use]
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// Set the bound of the job queue. Zero is raised to one.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrency = max;
        self
    }

    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
