//! Job handler registry.
//!
//! Maps activity ids to the async functions that perform their background
//! work. Like any registry of closures it is code, not data: every process
//! that runs workers builds the same registry at startup.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use workflow_core::background::ScheduledBackgroundActivity;
use workflow_core::primitives::ActivityId;

/// Type-erased job handler.
pub type JobHandler =
    Arc<dyn Fn(ScheduledBackgroundActivity) -> BoxFuture<'static, anyhow::Result<serde_json::Value>> + Send + Sync>;

#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<ActivityId, JobHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async closure as the handler for `activity_id`.
    ///
    /// ```rust,ignore
    /// registry.register_fn("send-mail", |job| async move {
    ///     mailer.send(&job.input).await?;
    ///     Ok(serde_json::json!({ "sent": true }))
    /// });
    /// ```
    pub fn register_fn<F, Fut>(&mut self, activity_id: impl Into<ActivityId>, func: F)
    where
        F: Fn(ScheduledBackgroundActivity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let handler: JobHandler = Arc::new(move |job| func(job).boxed());
        self.handlers.insert(activity_id.into(), handler);
    }

    #[must_use]
    pub fn with_fn<F, Fut>(mut self, activity_id: impl Into<ActivityId>, func: F) -> Self
    where
        F: Fn(ScheduledBackgroundActivity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        self.register_fn(activity_id, func);
        self
    }

    pub fn get(&self, activity_id: &ActivityId) -> Option<JobHandler> {
        self.handlers.get(activity_id).cloned()
    }

    pub fn contains(&self, activity_id: &ActivityId) -> bool {
        self.handlers.contains_key(activity_id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("activities", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
