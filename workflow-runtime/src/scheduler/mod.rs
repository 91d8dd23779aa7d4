//! Background activity scheduling.
//!
//! The engine only needs a correlation id back from the scheduler. How the job
//! runs (in-process task, external queue, another process) is up to the
//! implementation.

mod local;

pub use local::{BackgroundJob, JobQueue, LocalBackgroundScheduler};

use async_trait::async_trait;
use workflow_core::background::ScheduledBackgroundActivity;
use workflow_core::primitives::{ActivityId, JobId};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler refused the request.
    #[error("Scheduler rejected the job: {0}")]
    Rejected(String),
    /// The consuming side of the job queue is gone.
    #[error("Job queue is closed")]
    QueueClosed,
    #[error("No job handler registered for activity '{0}'")]
    UnknownActivity(ActivityId),
}

/// Submits background activities for out-of-band execution.
///
/// Must be safe to call from turns of different instances concurrently.
/// Timeouts and cancellation are the implementation's concern; they surface
/// as errors.
#[async_trait]
pub trait BackgroundActivityScheduler: Send + Sync {
    async fn schedule(&self, activity: &ScheduledBackgroundActivity) -> Result<JobId, SchedulerError>;
}
