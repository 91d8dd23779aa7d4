//! The aggregate for one running workflow instance.

use crate::activity::{ActivityExecutionContext, ActivityStatus};
use crate::background::ScheduledBackgroundActivity;
use crate::bookmark::{Bookmark, BookmarkHasher, BookmarkSet};
use crate::callback::{CompletionCallback, CompletionCallbacks};
use crate::error::WorkflowError;
use crate::primitives::{ActivityId, ActivityInstanceId, BookmarkId};
use crate::snapshot::{WorkflowInstanceSnapshot, WorkflowState};
use crate::transient::TransientProperties;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Overall progress of an instance, derived from its tree and bookmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Running,
    Suspended,
    Finished,
    Faulted,
}

/// Execution state of one workflow instance.
///
/// Owned by exactly one turn at a time; no interior locking. The activity
/// tree, bookmarks and version are durable. Transient properties and
/// completion callbacks only live for the current turn.
#[derive(Debug, Clone)]
pub struct WorkflowExecutionContext {
    id: String,
    definition_id: String,
    correlation_id: Option<String>,
    version: u64,
    activities: Vec<ActivityExecutionContext>,
    bookmarks: BookmarkSet,
    input: Option<HashMap<String, serde_json::Value>>,
    transient: TransientProperties,
    callbacks: CompletionCallbacks,
}

impl WorkflowExecutionContext {
    pub fn new(definition_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            id: instance_id.into(),
            definition_id: definition_id.into(),
            correlation_id: None,
            version: 0,
            activities: Vec::new(),
            bookmarks: BookmarkSet::new(),
            input: None,
            transient: TransientProperties::default(),
            callbacks: CompletionCallbacks::default(),
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: HashMap<String, serde_json::Value>) -> Self {
        self.input = Some(input);
        self
    }

    /// Rebuild a context from a persisted snapshot.
    pub fn from_snapshot(snapshot: WorkflowInstanceSnapshot) -> Self {
        let mut context = Self::new(
            snapshot.definition_id.clone(),
            snapshot.instance_id.clone(),
        );
        context.import_state(snapshot);
        context
    }

    /// Replace the whole durable state with `snapshot`.
    ///
    /// Tree, bookmarks, version and input are overwritten, never merged.
    /// Per-turn state is dropped as well since it may refer to nodes that no
    /// longer exist.
    pub fn import_state(&mut self, snapshot: WorkflowInstanceSnapshot) {
        let WorkflowInstanceSnapshot {
            definition_id,
            instance_id,
            version,
            workflow_state,
            input,
        } = snapshot;
        let WorkflowState {
            correlation_id,
            activities,
            bookmarks,
            ..
        } = workflow_state;

        self.id = instance_id;
        self.definition_id = definition_id;
        self.correlation_id = correlation_id;
        self.version = version;
        self.activities = activities;
        self.bookmarks = bookmarks;
        self.input = input;
        self.end_turn();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn increment_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub fn input(&self) -> Option<&HashMap<String, serde_json::Value>> {
        self.input.as_ref()
    }

    pub fn status(&self) -> WorkflowStatus {
        if self
            .activities
            .iter()
            .any(|a| a.status == ActivityStatus::Faulted)
        {
            return WorkflowStatus::Faulted;
        }
        if !self.bookmarks.is_empty() {
            return WorkflowStatus::Suspended;
        }
        match self.root() {
            Some(root) if root.status == ActivityStatus::Completed => WorkflowStatus::Finished,
            _ => WorkflowStatus::Running,
        }
    }

    // Execution tree

    pub fn activities(&self) -> &[ActivityExecutionContext] {
        &self.activities
    }

    pub fn root(&self) -> Option<&ActivityExecutionContext> {
        self.activities.iter().find(|a| a.is_root())
    }

    pub fn activity(&self, id: &ActivityInstanceId) -> Option<&ActivityExecutionContext> {
        self.activities.iter().find(|a| &a.id == id)
    }

    pub fn activity_mut(
        &mut self,
        id: &ActivityInstanceId,
    ) -> Option<&mut ActivityExecutionContext> {
        self.activities.iter_mut().find(|a| &a.id == id)
    }

    pub fn require_activity(
        &self,
        id: &ActivityInstanceId,
    ) -> Result<&ActivityExecutionContext, WorkflowError> {
        self.activity(id)
            .ok_or_else(|| WorkflowError::ActivityNotFound(id.clone()))
    }

    /// Add a node for `activity_id` under `parent` (or as root).
    pub fn spawn_activity(
        &mut self,
        activity_id: ActivityId,
        parent: Option<&ActivityInstanceId>,
    ) -> Result<ActivityInstanceId, WorkflowError> {
        if let Some(parent) = parent {
            self.require_activity(parent)?;
        }
        let node = ActivityExecutionContext::new(activity_id, parent.cloned());
        let id = node.id.clone();
        self.activities.push(node);
        Ok(id)
    }

    pub fn children(
        &self,
        id: &ActivityInstanceId,
    ) -> impl Iterator<Item = &ActivityExecutionContext> {
        let id = id.clone();
        self.activities
            .iter()
            .filter(move |a| a.parent_id.as_ref() == Some(&id))
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(
        &self,
        id: &ActivityInstanceId,
    ) -> Result<Vec<ActivityInstanceId>, WorkflowError> {
        let mut ancestors = Vec::new();
        let mut current = self.require_activity(id)?.parent_id.clone();
        while let Some(parent_id) = current {
            let parent = self.require_activity(&parent_id)?;
            current = parent.parent_id.clone();
            ancestors.push(parent_id);
        }
        Ok(ancestors)
    }

    /// Move an activity to `status`.
    ///
    /// Terminal statuses are final. Re-applying the same terminal status is allowed.
    pub fn set_status(
        &mut self,
        id: &ActivityInstanceId,
        status: ActivityStatus,
    ) -> Result<(), WorkflowError> {
        let activity = self
            .activity_mut(id)
            .ok_or_else(|| WorkflowError::ActivityNotFound(id.clone()))?;
        if activity.status.is_terminal() && activity.status != status {
            return Err(WorkflowError::InvalidTransition {
                id: id.clone(),
                from: activity.status,
                to: status,
            });
        }
        activity.status = status;
        Ok(())
    }

    /// Spawn a child of `owner` and register the continuation to run when it completes.
    pub fn schedule_child(
        &mut self,
        owner: &ActivityInstanceId,
        child_activity_id: ActivityId,
        callback: Arc<dyn CompletionCallback>,
    ) -> Result<ActivityInstanceId, WorkflowError> {
        let child = self.spawn_activity(child_activity_id.clone(), Some(owner))?;
        self.callbacks
            .register(owner.clone(), child_activity_id, callback);
        Ok(child)
    }

    // Completion callbacks

    pub fn register_completion_callback(
        &mut self,
        owner: ActivityInstanceId,
        child: ActivityId,
        callback: Arc<dyn CompletionCallback>,
    ) {
        self.callbacks.register(owner, child, callback);
    }

    pub fn pop_completion_callback(
        &mut self,
        owner: &ActivityInstanceId,
        child: &ActivityId,
    ) -> Option<Arc<dyn CompletionCallback>> {
        self.callbacks.pop(owner, child)
    }

    pub fn completion_callbacks(&self) -> &CompletionCallbacks {
        &self.callbacks
    }

    // Bookmarks

    pub fn bookmarks(&self) -> &BookmarkSet {
        &self.bookmarks
    }

    pub fn bookmarks_mut(&mut self) -> &mut BookmarkSet {
        &mut self.bookmarks
    }

    /// Suspend `activity_instance_id` on a new bookmark.
    pub fn create_bookmark(
        &mut self,
        activity_instance_id: &ActivityInstanceId,
        name: impl Into<String>,
        payload: Bytes,
        hasher: &dyn BookmarkHasher,
    ) -> Result<BookmarkId, WorkflowError> {
        let activity_id = self.require_activity(activity_instance_id)?.activity_id.clone();
        let bookmark = Bookmark::new(
            name,
            payload,
            hasher,
            activity_id,
            activity_instance_id.clone(),
        );
        let id = bookmark.id.clone();
        self.set_status(activity_instance_id, ActivityStatus::Suspended)?;
        self.bookmarks.add(bookmark);
        Ok(id)
    }

    /// Remove a bookmark because the event it waited for has arrived.
    ///
    /// The owning activity goes back to `Running`.
    pub fn resolve_bookmark(&mut self, id: &BookmarkId) -> Result<Bookmark, WorkflowError> {
        let bookmark = self
            .bookmarks
            .remove(id)
            .ok_or_else(|| WorkflowError::BookmarkNotFound(id.clone()))?;
        if let Some(activity) = self.activity_mut(&bookmark.activity_instance_id) {
            if activity.status == ActivityStatus::Suspended {
                activity.status = ActivityStatus::Running;
            }
        }
        Ok(bookmark)
    }

    // Transient state

    pub fn transient(&self) -> &TransientProperties {
        &self.transient
    }

    pub fn transient_mut(&mut self) -> &mut TransientProperties {
        &mut self.transient
    }

    pub fn schedule_background_activity(&mut self, activity: ScheduledBackgroundActivity) {
        self.transient.schedule_background_activity(activity);
    }

    /// Drop all per-turn state.
    pub fn end_turn(&mut self) {
        self.transient.clear();
        self.callbacks.clear();
        for activity in &mut self.activities {
            activity.properties.clear();
        }
    }
}
