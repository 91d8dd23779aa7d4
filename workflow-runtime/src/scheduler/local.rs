use super::{BackgroundActivityScheduler, SchedulerError};
use crate::config::RuntimeConfig;
use crate::registry::JobRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use workflow_core::background::ScheduledBackgroundActivity;
use workflow_core::primitives::JobId;

/// A job accepted by the [`LocalBackgroundScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundJob {
    pub job_id: JobId,
    pub scheduled: ScheduledBackgroundActivity,
}

/// Receiving end of the local job queue, drained by a
/// [`BackgroundWorker`](crate::worker::BackgroundWorker).
#[derive(Debug)]
pub struct JobQueue {
    receiver: mpsc::Receiver<BackgroundJob>,
}

impl JobQueue {
    /// Next job, or `None` once every scheduler handle is dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<BackgroundJob> {
        self.receiver.recv().await
    }

    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// In-process scheduler backed by a bounded channel.
///
/// `schedule` waits for queue capacity, so a full queue applies backpressure
/// to the committing turn.
#[derive(Clone)]
pub struct LocalBackgroundScheduler {
    sender: mpsc::Sender<BackgroundJob>,
    registry: Option<Arc<JobRegistry>>,
}

impl LocalBackgroundScheduler {
    /// Create a scheduler and the queue its jobs land in.
    pub fn channel(capacity: usize) -> (Self, JobQueue) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                registry: None,
            },
            JobQueue { receiver },
        )
    }

    /// Create a scheduler whose queue holds `config.queue_capacity` jobs.
    pub fn from_config(config: &RuntimeConfig) -> (Self, JobQueue) {
        Self::channel(config.queue_capacity)
    }

    /// Reject activities that have no registered handler at schedule time
    /// instead of failing later in the worker.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<JobRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }
}

#[async_trait]
impl BackgroundActivityScheduler for LocalBackgroundScheduler {
    async fn schedule(&self, activity: &ScheduledBackgroundActivity) -> Result<JobId, SchedulerError> {
        if let Some(registry) = &self.registry {
            if !registry.contains(&activity.activity_id) {
                return Err(SchedulerError::UnknownActivity(activity.activity_id.clone()));
            }
        }

        let job_id = JobId::generate();
        self.sender
            .send(BackgroundJob {
                job_id: job_id.clone(),
                scheduled: activity.clone(),
            })
            .await
            .map_err(|_| SchedulerError::QueueClosed)?;

        tracing::debug!(
            instance_id = %activity.workflow_instance_id,
            activity_id = %activity.activity_id,
            job_id = %job_id,
            "Background job queued"
        );
        Ok(job_id)
    }
}
