//! Background worker for locally scheduled jobs.
//!
//! A worker drains the [`JobQueue`] filled by a
//! [`LocalBackgroundScheduler`](crate::scheduler::LocalBackgroundScheduler),
//! runs each job through the [`JobRegistry`] and reports the outcome on a
//! completion channel. Feeding completions back into the owning workflow
//! instance is the host's job, see
//! [`WorkflowHost::complete_background_job`](crate::host::WorkflowHost::complete_background_job).

use crate::config::RuntimeConfig;
use crate::registry::JobRegistry;
use crate::scheduler::{BackgroundJob, JobQueue};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use workflow_core::background::ScheduledBackgroundActivity;
use workflow_core::primitives::JobId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "value")]
pub enum JobOutcome {
    Succeeded(serde_json::Value),
    Failed(String),
}

/// Result of one background job, matched back to its bookmark by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletion {
    pub job_id: JobId,
    pub scheduled: ScheduledBackgroundActivity,
    pub outcome: JobOutcome,
}

/// Runs queued background jobs with bounded concurrency.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(JobRegistry::new().with_fn("send-mail", send_mail));
/// let (scheduler, queue) = LocalBackgroundScheduler::from_config(&config);
/// let (completions, mut results) = tokio::sync::mpsc::channel(config.queue_capacity);
///
/// let worker = BackgroundWorker::from_config(&config, registry);
/// tokio::spawn(worker.run(queue, completions));
///
/// while let Some(completion) = results.recv().await {
///     host.complete_background_job(&completion).await?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BackgroundWorker {
    worker_id: String,
    registry: Arc<JobRegistry>,
    max_concurrency: NonZeroUsize,
    job_timeout: Option<Duration>,
}

impl BackgroundWorker {
    /// Create a worker that runs one job at a time without timeout.
    pub fn new(worker_id: impl Into<String>, registry: Arc<JobRegistry>) -> Self {
        Self {
            worker_id: worker_id.into(),
            registry,
            max_concurrency: NonZeroUsize::MIN,
            job_timeout: None,
        }
    }

    pub fn from_config(config: &RuntimeConfig, registry: Arc<JobRegistry>) -> Self {
        Self::new(config.worker_id.clone(), registry)
            .with_max_concurrency(config.max_concurrency)
            .with_job_timeout(config.job_timeout)
    }

    /// Set the maximum number of jobs executing at once (default: 1).
    #[must_use]
    pub fn with_max_concurrency(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Fail jobs that run longer than `timeout`.
    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Execute a single job. Handler errors, timeouts and unknown activities
    /// become a [`JobOutcome::Failed`]; this never returns an error itself.
    pub async fn execute(&self, job: BackgroundJob) -> JobCompletion {
        let BackgroundJob { job_id, scheduled } = job;

        tracing::debug!(
            worker_id = %self.worker_id,
            instance_id = %scheduled.workflow_instance_id,
            activity_id = %scheduled.activity_id,
            job_id = %job_id,
            "Executing background job"
        );

        let outcome = match self.registry.get(&scheduled.activity_id) {
            None => JobOutcome::Failed(format!(
                "No job handler registered for activity '{}'",
                scheduled.activity_id
            )),
            Some(handler) => {
                let running = handler(scheduled.clone());
                let result = match self.job_timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, running).await {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!("Job timed out after {:?}", timeout)),
                    },
                    None => running.await,
                };
                match result {
                    Ok(value) => JobOutcome::Succeeded(value),
                    Err(e) => JobOutcome::Failed(format!("{e:#}")),
                }
            }
        };

        match &outcome {
            JobOutcome::Succeeded(_) => tracing::debug!(
                worker_id = %self.worker_id,
                job_id = %job_id,
                "Background job completed"
            ),
            JobOutcome::Failed(error) => tracing::warn!(
                worker_id = %self.worker_id,
                job_id = %job_id,
                error = %error,
                "Background job failed"
            ),
        }

        JobCompletion {
            job_id,
            scheduled,
            outcome,
        }
    }

    /// Drain `queue` until every scheduler handle is dropped.
    ///
    /// Jobs still running when the queue closes are awaited before returning.
    pub async fn run(
        self,
        mut queue: JobQueue,
        completions: mpsc::Sender<JobCompletion>,
    ) -> anyhow::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency.get()));
        let worker = Arc::new(self);
        let mut running = JoinSet::new();

        tracing::info!(
            worker_id = %worker.worker_id,
            max_concurrency = worker.max_concurrency.get(),
            "Background worker started"
        );

        loop {
            // Wait for capacity before taking the next job off the queue.
            let permit = semaphore.clone().acquire_owned().await?;
            let Some(job) = queue.recv().await else {
                break;
            };

            let job_worker = Arc::clone(&worker);
            let completions = completions.clone();
            running.spawn(async move {
                let _permit = permit;
                let completion = job_worker.execute(job).await;
                if completions.send(completion).await.is_err() {
                    tracing::warn!(
                        worker_id = %job_worker.worker_id,
                        "Completion channel closed, dropping job result"
                    );
                }
            });

            while let Some(finished) = running.try_join_next() {
                Self::log_join(&worker.worker_id, finished);
            }
        }

        while let Some(finished) = running.join_next().await {
            Self::log_join(&worker.worker_id, finished);
        }

        tracing::info!(worker_id = %worker.worker_id, "Background worker stopped");
        Ok(())
    }

    fn log_join(worker_id: &str, result: Result<(), tokio::task::JoinError>) {
        if let Err(e) = result {
            tracing::error!(worker_id = %worker_id, error = %e, "Background job task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{BackgroundActivityScheduler, LocalBackgroundScheduler};
    use workflow_core::primitives::{ActivityId, ActivityInstanceId, BookmarkId};

    fn request(activity_id: &str, input: serde_json::Value) -> ScheduledBackgroundActivity {
        ScheduledBackgroundActivity {
            workflow_instance_id: "instance-1".to_string(),
            activity_id: ActivityId::new(activity_id),
            activity_instance_id: ActivityInstanceId::new("node-1"),
            bookmark_id: BookmarkId::new("bookmark-1"),
            input,
        }
    }

    fn registry() -> Arc<JobRegistry> {
        Arc::new(
            JobRegistry::new()
                .with_fn("echo", |job| async move { Ok::<_, anyhow::Error>(job.input) })
                .with_fn("fail", |_| async { Err::<serde_json::Value, _>(anyhow::anyhow!("boom")) })
                .with_fn("slow", |_| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, anyhow::Error>(serde_json::Value::Null)
                }),
        )
    }

    fn job(activity_id: &str) -> BackgroundJob {
        BackgroundJob {
            job_id: JobId::new("J-1"),
            scheduled: request(activity_id, serde_json::json!({"n": 1})),
        }
    }

    #[test]
    fn test_from_config() {
        let config = RuntimeConfig::default()
            .with_worker_id("w-9")
            .with_max_concurrency(NonZeroUsize::new(3).unwrap())
            .with_job_timeout(Some(Duration::from_secs(5)));
        let worker = BackgroundWorker::from_config(&config, registry());
        assert_eq!(worker.worker_id(), "w-9");
        assert_eq!(worker.max_concurrency.get(), 3);
        assert_eq!(worker.job_timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let worker = BackgroundWorker::new("w-1", registry());
        let completion = worker.execute(job("echo")).await;
        assert_eq!(completion.job_id, JobId::new("J-1"));
        assert_eq!(completion.outcome, JobOutcome::Succeeded(serde_json::json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_execute_failure_is_reported() {
        let worker = BackgroundWorker::new("w-1", registry());
        let completion = worker.execute(job("fail")).await;
        assert_eq!(completion.outcome, JobOutcome::Failed("boom".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_activity_fails_job() {
        let worker = BackgroundWorker::new("w-1", registry());
        let completion = worker.execute(job("missing")).await;
        assert!(matches!(completion.outcome, JobOutcome::Failed(ref e) if e.contains("missing")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let worker =
            BackgroundWorker::new("w-1", registry()).with_job_timeout(Some(Duration::from_secs(1)));
        let completion = worker.execute(job("slow")).await;
        assert!(matches!(completion.outcome, JobOutcome::Failed(ref e) if e.contains("timed out")));
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_closed() {
        let (scheduler, queue) = LocalBackgroundScheduler::channel(8);
        let (completions, mut results) = mpsc::channel(8);
        let worker = BackgroundWorker::new("w-1", registry())
            .with_max_concurrency(NonZeroUsize::new(2).unwrap());
        let handle = tokio::spawn(worker.run(queue, completions));

        let first = scheduler.schedule(&request("echo", serde_json::json!(1))).await.unwrap();
        let second = scheduler.schedule(&request("fail", serde_json::Value::Null)).await.unwrap();
        drop(scheduler);

        handle.await.unwrap().unwrap();

        let mut seen = Vec::new();
        while let Some(completion) = results.recv().await {
            seen.push(completion);
        }
        assert_eq!(seen.len(), 2);
        let echo = seen.iter().find(|c| c.job_id == first).unwrap();
        assert_eq!(echo.outcome, JobOutcome::Succeeded(serde_json::json!(1)));
        let failed = seen.iter().find(|c| c.job_id == second).unwrap();
        assert!(matches!(failed.outcome, JobOutcome::Failed(_)));
    }
}
