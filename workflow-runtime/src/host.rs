//! Turn lifecycle of workflow instances.
//!
//! A turn starts from a fresh context or the latest snapshot, runs activity
//! code against the context, and ends with [`WorkflowHost::commit`], which
//! persists the bookmark delta, publishes [`WorkflowBookmarksIndexed`] and
//! stores the final snapshot.
//!
//! A host lets at most one turn per instance be open at a time. Opening a
//! second turn for the same instance waits until the first is committed or
//! dropped, so a job completion that arrives while its scheduling turn is
//! still being persisted is applied after that turn's snapshot is stored.
//! Hosts in different processes sharing one backend are kept apart by the
//! snapshot version check instead.

use crate::error::HostError;
use crate::indexing::BookmarkIndexer;
use crate::mediator::Mediator;
use crate::notifications::WorkflowBookmarksIndexed;
use crate::worker::{JobCompletion, JobOutcome};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use workflow_core::background::BackgroundActivityBookmark;
use workflow_core::bookmark::{BookmarkHasher, BookmarkSet, Sha256BookmarkHasher};
use workflow_core::codec::{Codec, sealed};
use workflow_core::context::WorkflowExecutionContext;
use workflow_core::primitives::{ActivityInstanceId, BookmarkId};
use workflow_core::signal::SignalDispatcher;
use workflow_core::snapshot::{SnapshotSerializer, WorkflowStateSerializer};
use workflow_persistence::{BackendError, PersistentBackend, StoredBookmark};

/// Per-instance turn locks of one host.
#[derive(Default)]
struct InstanceLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InstanceLocks {
    async fn acquire(&self, instance_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only referenced by the map are neither held nor awaited.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(instance_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// One open turn of a workflow instance.
///
/// Remembers the bookmarks the turn started with so that commit can persist
/// only what changed. Holds the instance's turn lock until it is committed
/// or dropped.
pub struct WorkflowTurn {
    context: WorkflowExecutionContext,
    baseline: BookmarkSet,
    dispatcher: Arc<SignalDispatcher>,
    _lease: OwnedMutexGuard<()>,
}

impl WorkflowTurn {
    fn new(
        context: WorkflowExecutionContext,
        dispatcher: Arc<SignalDispatcher>,
        lease: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            baseline: context.bookmarks().clone(),
            context,
            dispatcher,
            _lease: lease,
        }
    }

    pub fn context(&self) -> &WorkflowExecutionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut WorkflowExecutionContext {
        &mut self.context
    }

    /// Bookmarks as they were when the turn started.
    pub fn baseline(&self) -> &BookmarkSet {
        &self.baseline
    }

    pub async fn complete_activity(
        &mut self,
        id: &ActivityInstanceId,
        result: Option<serde_json::Value>,
    ) -> anyhow::Result<()> {
        self.dispatcher
            .complete_activity(&mut self.context, id, result)
            .await
    }

    pub async fn fault_activity(
        &mut self,
        id: &ActivityInstanceId,
        error: impl Into<String>,
    ) -> anyhow::Result<()> {
        self.dispatcher
            .fault_activity(&mut self.context, id, error)
            .await
    }

    /// Abandon the turn and keep its context. Nothing is persisted.
    pub fn into_context(self) -> WorkflowExecutionContext {
        self.context
    }
}

impl std::fmt::Debug for WorkflowTurn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowTurn")
            .field("context", &self.context)
            .field("baseline", &self.baseline)
            .finish_non_exhaustive()
    }
}

/// Loads, advances and persists workflow instances.
///
/// # Example
///
/// ```rust,ignore
/// let backend = Arc::new(InMemoryBackend::new());
/// let handler = ScheduleBackgroundActivities::new(scheduler, backend.clone(), Arc::new(JsonCodec));
/// let host = WorkflowHost::new(backend, Arc::new(JsonCodec))
///     .with_mediator(Mediator::new().with_handler::<WorkflowBookmarksIndexed>(Arc::new(handler)));
///
/// let mut turn = host.start("order-flow", "order-17", None).await;
/// // run activities against turn.context_mut()
/// let context = host.commit(turn).await?;
/// ```
pub struct WorkflowHost<B: ?Sized, C> {
    backend: Arc<B>,
    codec: Arc<C>,
    mediator: Arc<Mediator>,
    dispatcher: Arc<SignalDispatcher>,
    hasher: Arc<dyn BookmarkHasher>,
    serializer: Arc<dyn WorkflowStateSerializer>,
    indexer: BookmarkIndexer,
    locks: InstanceLocks,
}

impl<B, C> WorkflowHost<B, C>
where
    B: PersistentBackend + ?Sized,
    C: Codec + sealed::DecodeValue<BackgroundActivityBookmark>,
{
    pub fn new(backend: Arc<B>, codec: Arc<C>) -> Self {
        Self {
            backend,
            codec,
            mediator: Arc::new(Mediator::new()),
            dispatcher: Arc::new(SignalDispatcher::new()),
            hasher: Arc::new(Sha256BookmarkHasher),
            serializer: Arc::new(SnapshotSerializer),
            indexer: BookmarkIndexer,
            locks: InstanceLocks::default(),
        }
    }

    #[must_use]
    pub fn with_mediator(mut self, mediator: Mediator) -> Self {
        self.mediator = Arc::new(mediator);
        self
    }

    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: SignalDispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn BookmarkHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn WorkflowStateSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn hasher(&self) -> &dyn BookmarkHasher {
        self.hasher.as_ref()
    }

    /// Open the first turn of a new instance.
    ///
    /// Waits while another turn of `instance_id` is open on this host.
    pub async fn start(
        &self,
        definition_id: impl Into<String>,
        instance_id: impl Into<String>,
        input: Option<HashMap<String, serde_json::Value>>,
    ) -> WorkflowTurn {
        let mut context = WorkflowExecutionContext::new(definition_id, instance_id);
        if let Some(input) = input {
            context = context.with_input(input);
        }
        let lease = self.locks.acquire(context.id()).await;
        tracing::debug!(instance_id = %context.id(), "Starting workflow instance");
        WorkflowTurn::new(context, Arc::clone(&self.dispatcher), lease)
    }

    /// Open a turn from the latest snapshot of `instance_id`.
    ///
    /// Waits while another turn of the instance is open on this host, so a
    /// caller must not load an instance it already holds a turn for. Stored
    /// bookmarks that disagree with the snapshot are repaired first.
    pub async fn load(&self, instance_id: &str) -> Result<WorkflowTurn, HostError> {
        let lease = self.locks.acquire(instance_id).await;
        let snapshot = self.backend.load_snapshot(instance_id).await?;
        let turn = WorkflowTurn::new(
            WorkflowExecutionContext::from_snapshot(snapshot),
            Arc::clone(&self.dispatcher),
            lease,
        );
        self.reconcile(&turn).await?;
        tracing::debug!(
            instance_id = %turn.context.id(),
            version = turn.context.version(),
            "Loaded workflow instance"
        );
        Ok(turn)
    }

    /// Make the stored bookmarks of an instance match its snapshot.
    ///
    /// The per-bookmark writes and the snapshot write of a commit are not
    /// atomic, so a crash between them can leave the bookmark store ahead of
    /// or behind the snapshot. The snapshot wins. Takes an open turn so the
    /// repair never races a commit of the same instance. Returns the number
    /// of stored bookmarks that were rewritten or removed.
    pub async fn reconcile(&self, turn: &WorkflowTurn) -> Result<usize, HostError> {
        let context = &turn.context;
        let stored = self.backend.list_bookmarks(context.id()).await?;
        let mut repaired = 0;

        for entry in &stored {
            if !context.bookmarks().contains(&entry.bookmark_id) {
                self.backend
                    .remove_bookmark(context.id(), &entry.bookmark_id)
                    .await?;
                repaired += 1;
            }
        }
        for bookmark in context.bookmarks().iter() {
            let expected =
                StoredBookmark::from_bookmark(bookmark, context.id(), context.correlation_id());
            let current = stored.iter().find(|s| s.bookmark_id == bookmark.id);
            if current != Some(&expected) {
                self.backend.update_bookmark(expected).await?;
                repaired += 1;
            }
        }

        if repaired > 0 {
            tracing::warn!(
                instance_id = %context.id(),
                repaired,
                "Stored bookmarks diverged from snapshot, reconciled"
            );
        }
        Ok(repaired)
    }

    /// End a turn: bump the version, persist the bookmark delta, run the
    /// indexing handlers and store the final snapshot.
    ///
    /// On error nothing further is written and the context is dropped; the
    /// instance stays at its last stored snapshot and the turn can be retried
    /// from a fresh [`load`](Self::load).
    pub async fn commit(&self, turn: WorkflowTurn) -> Result<WorkflowExecutionContext, HostError> {
        // The lease is released on return, after the final snapshot is stored.
        let WorkflowTurn {
            mut context,
            baseline,
            _lease,
            ..
        } = turn;
        let version = context.increment_version();
        let indexed = self.indexer.index(&baseline, context.bookmarks());

        for removed in &indexed.removed {
            self.backend.remove_bookmark(context.id(), &removed.id).await?;
        }
        for added in &indexed.added {
            self.backend
                .update_bookmark(StoredBookmark::from_bookmark(
                    added,
                    context.id(),
                    context.correlation_id(),
                ))
                .await?;
        }

        tracing::debug!(
            instance_id = %context.id(),
            version,
            added = indexed.added.len(),
            removed = indexed.removed.len(),
            unchanged = indexed.unchanged.len(),
            "Bookmarks indexed"
        );

        let mut notification = WorkflowBookmarksIndexed {
            context,
            indexed_bookmarks: indexed,
        };
        self.mediator.publish(&mut notification).await?;
        let mut context = notification.context;

        let snapshot = self
            .serializer
            .serialize_state(&context)
            .map_err(|e| HostError::Serialization(format!("{e:#}")))?;
        self.backend.import_workflow_state(snapshot).await?;
        context.end_turn();

        tracing::info!(
            instance_id = %context.id(),
            version,
            status = ?context.status(),
            "Turn committed"
        );
        Ok(context)
    }

    /// Load `instance_id`, resolve `bookmark_id` and complete the suspended
    /// activity with `result`. The returned turn still has to be committed.
    pub async fn resume_bookmark(
        &self,
        instance_id: &str,
        bookmark_id: &BookmarkId,
        result: Option<serde_json::Value>,
    ) -> Result<WorkflowTurn, HostError> {
        let mut turn = self.load(instance_id).await?;
        let bookmark = turn.context_mut().resolve_bookmark(bookmark_id)?;
        turn.complete_activity(&bookmark.activity_instance_id, result)
            .await?;
        Ok(turn)
    }

    /// Stored bookmarks matching `hash`, across all instances.
    pub async fn find_bookmarks(&self, hash: &str) -> Result<Vec<StoredBookmark>, HostError> {
        Ok(self.backend.find_bookmarks(hash).await?)
    }

    /// Resume every instance suspended on a bookmark with `hash`.
    ///
    /// Each matching instance is loaded once and all of its matching
    /// bookmarks are resolved in that single turn. Returns one open turn per
    /// instance, in instance id order. Every returned turn holds its
    /// instance's lock until it is committed or dropped.
    pub async fn resume_by_hash(
        &self,
        hash: &str,
        result: Option<serde_json::Value>,
    ) -> Result<Vec<WorkflowTurn>, HostError> {
        let mut by_instance: BTreeMap<String, Vec<BookmarkId>> = BTreeMap::new();
        for stored in self.find_bookmarks(hash).await? {
            by_instance
                .entry(stored.instance_id)
                .or_default()
                .push(stored.bookmark_id);
        }

        let mut turns = Vec::with_capacity(by_instance.len());
        for (instance_id, bookmark_ids) in by_instance {
            let mut turn = match self.load(&instance_id).await {
                Ok(turn) => turn,
                // Left behind by a first commit that failed after storing its bookmarks.
                Err(HostError::Store(BackendError::NotFound(_))) => {
                    tracing::warn!(
                        instance_id = %instance_id,
                        "Stored bookmark without snapshot, skipping"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            for bookmark_id in bookmark_ids {
                // The stored entry may have been stale; trust the snapshot.
                let matches = turn
                    .context()
                    .bookmarks()
                    .find(&bookmark_id)
                    .is_some_and(|b| b.hash() == hash);
                if !matches {
                    continue;
                }
                let bookmark = turn.context_mut().resolve_bookmark(&bookmark_id)?;
                turn.complete_activity(&bookmark.activity_instance_id, result.clone())
                    .await?;
            }
            turns.push(turn);
        }
        Ok(turns)
    }

    /// Feed the outcome of a background job back into its instance and commit.
    ///
    /// The completion is matched by instance id and bookmark id, and the
    /// bookmark must carry the same job id. Anything else is a stale
    /// completion (instance gone, bookmark already resolved, job superseded)
    /// and yields `Ok(None)`.
    ///
    /// Waits for any open turn of the instance first, so a completion racing
    /// the commit that scheduled its job sees that commit's snapshot.
    pub async fn complete_background_job(
        &self,
        completion: &JobCompletion,
    ) -> Result<Option<WorkflowExecutionContext>, HostError> {
        let scheduled = &completion.scheduled;
        let mut turn = match self.load(&scheduled.workflow_instance_id).await {
            Ok(turn) => turn,
            Err(HostError::Store(BackendError::NotFound(_))) => {
                tracing::warn!(
                    instance_id = %scheduled.workflow_instance_id,
                    job_id = %completion.job_id,
                    "Background job completed for unknown instance"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(bookmark) = turn.context().bookmarks().find(&scheduled.bookmark_id) else {
            tracing::warn!(
                instance_id = %scheduled.workflow_instance_id,
                bookmark_id = %scheduled.bookmark_id,
                job_id = %completion.job_id,
                "Bookmark already resolved, ignoring job completion"
            );
            return Ok(None);
        };
        let payload: BackgroundActivityBookmark = self
            .codec
            .decode(bookmark.payload())
            .map_err(|e| HostError::Serialization(format!("{e:#}")))?;
        if payload.job_id.as_ref() != Some(&completion.job_id) {
            tracing::warn!(
                instance_id = %scheduled.workflow_instance_id,
                bookmark_id = %scheduled.bookmark_id,
                job_id = %completion.job_id,
                "Job id does not match bookmark, ignoring stale completion"
            );
            return Ok(None);
        }

        let bookmark = turn.context_mut().resolve_bookmark(&scheduled.bookmark_id)?;
        match &completion.outcome {
            JobOutcome::Succeeded(value) => {
                turn.complete_activity(&bookmark.activity_instance_id, Some(value.clone()))
                    .await?
            }
            JobOutcome::Failed(error) => {
                turn.fault_activity(&bookmark.activity_instance_id, error.clone())
                    .await?
            }
        }
        self.commit(turn).await.map(Some)
    }
}
