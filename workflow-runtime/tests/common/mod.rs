#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use workflow_core::background::{
    BACKGROUND_ACTIVITY_BOOKMARK, BackgroundActivityBookmark, ScheduledBackgroundActivity,
};
use workflow_core::bookmark::Sha256BookmarkHasher;
use workflow_core::codec::Encoder;
use workflow_core::context::WorkflowExecutionContext;
use workflow_core::primitives::{ActivityId, ActivityInstanceId, BookmarkId, JobId};
use workflow_core::serialization::JsonCodec;
use workflow_core::snapshot::{WorkflowInstanceSnapshot, WorkflowStateSerializer};
use workflow_persistence::{BackendError, InMemoryBackend, PersistentBackend, StoredBookmark};
use workflow_runtime::{BackgroundActivityScheduler, SchedulerError};

pub const INSTANCE_ID: &str = "instance-1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workflow_runtime=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// In-memory backend that records every bookmark update and state import.
#[derive(Default)]
pub struct RecordingBackend {
    pub inner: InMemoryBackend,
    pub updates: Mutex<Vec<StoredBookmark>>,
    pub imports: Mutex<Vec<WorkflowInstanceSnapshot>>,
    pub fail_updates: AtomicBool,
    pub import_delay_ms: AtomicU64,
}

impl RecordingBackend {
    pub fn updates(&self) -> Vec<StoredBookmark> {
        self.updates.lock().unwrap().clone()
    }

    pub fn imports(&self) -> Vec<WorkflowInstanceSnapshot> {
        self.imports.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.updates.lock().unwrap().clear();
        self.imports.lock().unwrap().clear();
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Make every state import take `delay`, like a slow remote store.
    pub fn delay_imports(&self, delay: Duration) {
        self.import_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistentBackend for RecordingBackend {
    async fn import_workflow_state(
        &self,
        snapshot: WorkflowInstanceSnapshot,
    ) -> Result<(), BackendError> {
        let delay = self.import_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.imports.lock().unwrap().push(snapshot.clone());
        self.inner.import_workflow_state(snapshot).await
    }

    async fn load_snapshot(
        &self,
        instance_id: &str,
    ) -> Result<WorkflowInstanceSnapshot, BackendError> {
        self.inner.load_snapshot(instance_id).await
    }

    async fn delete_snapshot(&self, instance_id: &str) -> Result<(), BackendError> {
        self.inner.delete_snapshot(instance_id).await
    }

    async fn list_snapshots(&self) -> Result<Vec<String>, BackendError> {
        self.inner.list_snapshots().await
    }

    async fn update_bookmark(&self, bookmark: StoredBookmark) -> Result<(), BackendError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(BackendError::Backend("bookmark store unavailable".to_string()));
        }
        self.updates.lock().unwrap().push(bookmark.clone());
        self.inner.update_bookmark(bookmark).await
    }

    async fn remove_bookmark(
        &self,
        instance_id: &str,
        bookmark_id: &BookmarkId,
    ) -> Result<Option<StoredBookmark>, BackendError> {
        self.inner.remove_bookmark(instance_id, bookmark_id).await
    }

    async fn find_bookmarks(&self, hash: &str) -> Result<Vec<StoredBookmark>, BackendError> {
        self.inner.find_bookmarks(hash).await
    }

    async fn list_bookmarks(&self, instance_id: &str) -> Result<Vec<StoredBookmark>, BackendError> {
        self.inner.list_bookmarks(instance_id).await
    }
}

/// Hands out pre-arranged job ids, then rejects.
#[derive(Default)]
pub struct ScriptedScheduler {
    job_ids: Mutex<VecDeque<JobId>>,
    pub calls: Mutex<Vec<ScheduledBackgroundActivity>>,
}

impl ScriptedScheduler {
    pub fn returning<I, S>(job_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            job_ids: Mutex::new(job_ids.into_iter().map(|id| JobId::new(id)).collect()),
            calls: Mutex::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BackgroundActivityScheduler for ScriptedScheduler {
    async fn schedule(
        &self,
        activity: &ScheduledBackgroundActivity,
    ) -> Result<JobId, SchedulerError> {
        self.calls.lock().unwrap().push(activity.clone());
        self.job_ids
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SchedulerError::Rejected("no capacity".to_string()))
    }
}

pub struct FailingSerializer;

impl WorkflowStateSerializer for FailingSerializer {
    fn serialize_state(
        &self,
        _context: &WorkflowExecutionContext,
    ) -> anyhow::Result<WorkflowInstanceSnapshot> {
        anyhow::bail!("state is not serializable")
    }
}

pub fn empty_background_payload() -> bytes::Bytes {
    JsonCodec.encode(&BackgroundActivityBookmark::default()).unwrap()
}

/// Suspend a fresh child of `parent` on a background bookmark and queue the
/// background activity that should run for it.
pub fn suspend_on_background_job(
    context: &mut WorkflowExecutionContext,
    parent: &ActivityInstanceId,
    activity_id: &str,
) -> (ActivityInstanceId, BookmarkId) {
    let node = context
        .spawn_activity(ActivityId::new(activity_id), Some(parent))
        .unwrap();
    let bookmark_id = context
        .create_bookmark(
            &node,
            BACKGROUND_ACTIVITY_BOOKMARK,
            empty_background_payload(),
            &Sha256BookmarkHasher,
        )
        .unwrap();
    context.schedule_background_activity(ScheduledBackgroundActivity {
        workflow_instance_id: context.id().to_string(),
        activity_id: ActivityId::new(activity_id),
        activity_instance_id: node.clone(),
        bookmark_id: bookmark_id.clone(),
        input: serde_json::json!({ "activity": activity_id }),
    });
    (node, bookmark_id)
}

/// A context whose root has `count` children suspended on background jobs.
pub fn suspended_context(count: usize) -> (WorkflowExecutionContext, Vec<BookmarkId>) {
    let mut context = WorkflowExecutionContext::new("order-flow", INSTANCE_ID);
    let root = context.spawn_activity(ActivityId::new("flow"), None).unwrap();
    let bookmarks = (0..count)
        .map(|i| suspend_on_background_job(&mut context, &root, &format!("job-{i}")).1)
        .collect();
    (context, bookmarks)
}
