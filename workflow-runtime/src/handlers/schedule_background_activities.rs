use crate::error::IndexingError;
use crate::mediator::NotificationHandler;
use crate::notifications::WorkflowBookmarksIndexed;
use crate::scheduler::BackgroundActivityScheduler;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use workflow_core::background::BackgroundActivityBookmark;
use workflow_core::bookmark::{Bookmark, BookmarkHasher, Sha256BookmarkHasher};
use workflow_core::codec::{Codec, sealed};
use workflow_core::context::WorkflowExecutionContext;
use workflow_core::snapshot::{SnapshotSerializer, WorkflowStateSerializer};
use workflow_persistence::{PersistentBackend, StoredBookmark};

/// Submits the background activities requested during a turn and records the
/// returned job ids on their bookmarks.
///
/// The batch is all-or-nothing up to the first external write: every
/// referenced bookmark is checked, every job scheduled and the new workflow
/// state serialized before any bookmark is stored. A failure before that
/// point leaves the stores untouched. Jobs already submitted for a failed
/// batch are orphans; their completions no longer match any bookmark and are
/// dropped by the host.
///
/// Requests whose bookmark already carries a job id are skipped, so running
/// the handler again for the same turn schedules nothing new.
pub struct ScheduleBackgroundActivities<S: ?Sized, B: ?Sized, C> {
    scheduler: Arc<S>,
    backend: Arc<B>,
    codec: Arc<C>,
    hasher: Arc<dyn BookmarkHasher>,
    serializer: Arc<dyn WorkflowStateSerializer>,
}

impl<S, B, C> ScheduleBackgroundActivities<S, B, C>
where
    S: BackgroundActivityScheduler + ?Sized,
    B: PersistentBackend + ?Sized,
    C: Codec
        + sealed::EncodeValue<BackgroundActivityBookmark>
        + sealed::DecodeValue<BackgroundActivityBookmark>,
{
    pub fn new(scheduler: Arc<S>, backend: Arc<B>, codec: Arc<C>) -> Self {
        Self {
            scheduler,
            backend,
            codec,
            hasher: Arc::new(Sha256BookmarkHasher),
            serializer: Arc::new(SnapshotSerializer),
        }
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

    /// Process the background activity requests held by `context`.
    ///
    /// Returns the number of bookmarks that were updated with a job id.
    pub async fn index_background_activities(
        &self,
        context: &mut WorkflowExecutionContext,
    ) -> Result<usize, IndexingError> {
        let requests = context.transient().background_activities().to_vec();
        if requests.is_empty() {
            tracing::trace!(instance_id = %context.id(), "No background activities to schedule");
            return Ok(0);
        }

        for request in &requests {
            if !context.bookmarks().contains(&request.bookmark_id) {
                tracing::error!(
                    instance_id = %context.id(),
                    activity_id = %request.activity_id,
                    bookmark_id = %request.bookmark_id,
                    "Background activity refers to a missing bookmark"
                );
                return Err(IndexingError::Consistency {
                    bookmark_id: request.bookmark_id.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        let mut replacements: Vec<Bookmark> = Vec::with_capacity(requests.len());
        for request in &requests {
            if !seen.insert(request.bookmark_id.clone()) {
                tracing::warn!(
                    instance_id = %context.id(),
                    bookmark_id = %request.bookmark_id,
                    "Duplicate background activity request, skipping"
                );
                continue;
            }
            let bookmark = context.bookmarks().find(&request.bookmark_id).ok_or_else(|| {
                IndexingError::Consistency {
                    bookmark_id: request.bookmark_id.clone(),
                }
            })?;

            let mut payload: BackgroundActivityBookmark = self
                .codec
                .decode(bookmark.payload())
                .map_err(|e| IndexingError::Serialization(format!("{e:#}")))?;
            if let Some(job_id) = &payload.job_id {
                tracing::warn!(
                    instance_id = %context.id(),
                    bookmark_id = %request.bookmark_id,
                    job_id = %job_id,
                    "Background activity already scheduled, skipping"
                );
                continue;
            }

            let job_id = self.scheduler.schedule(request).await.map_err(|source| {
                IndexingError::Scheduling {
                    bookmark_id: request.bookmark_id.clone(),
                    source,
                }
            })?;
            tracing::debug!(
                instance_id = %context.id(),
                activity_id = %request.activity_id,
                bookmark_id = %request.bookmark_id,
                job_id = %job_id,
                "Background activity scheduled"
            );

            payload.job_id = Some(job_id);
            let encoded = self
                .codec
                .encode(&payload)
                .map_err(|e| IndexingError::Serialization(format!("{e:#}")))?;
            replacements.push(bookmark.with_payload(encoded, self.hasher.as_ref()));
        }

        if replacements.is_empty() {
            context.transient_mut().clear_background_activities();
            return Ok(0);
        }

        let original = context.bookmarks().clone();
        for replacement in &replacements {
            let id = replacement.id.clone();
            context.bookmarks_mut().replace(&id, replacement.clone())?;
        }
        let snapshot = match self.serializer.serialize_state(context) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                *context.bookmarks_mut() = original;
                return Err(IndexingError::Serialization(format!("{e:#}")));
            }
        };

        for replacement in &replacements {
            self.backend
                .update_bookmark(StoredBookmark::from_bookmark(
                    replacement,
                    context.id(),
                    context.correlation_id(),
                ))
                .await?;
        }
        context.transient_mut().clear_background_activities();
        self.backend.import_workflow_state(snapshot).await?;

        tracing::info!(
            instance_id = %context.id(),
            count = replacements.len(),
            "Background activities indexed"
        );
        Ok(replacements.len())
    }
}

#[async_trait]
impl<S, B, C> NotificationHandler<WorkflowBookmarksIndexed> for ScheduleBackgroundActivities<S, B, C>
where
    S: BackgroundActivityScheduler + ?Sized,
    B: PersistentBackend + ?Sized,
    C: Codec
        + sealed::EncodeValue<BackgroundActivityBookmark>
        + sealed::DecodeValue<BackgroundActivityBookmark>,
{
    async fn handle(&self, notification: &mut WorkflowBookmarksIndexed) -> anyhow::Result<()> {
        self.index_background_activities(&mut notification.context)
            .await?;
        Ok(())
    }
}
