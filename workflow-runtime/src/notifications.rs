//! Notifications published by the workflow host.

use crate::indexing::IndexedWorkflowBookmarks;
use crate::mediator::Notification;
use workflow_core::context::WorkflowExecutionContext;

/// Published once per committed turn, after the bookmark delta was persisted.
///
/// The notification owns the execution context for the duration of the
/// publish so handlers can finish per-turn work on it (scheduling background
/// jobs, rewriting bookmarks). The host takes the context back afterwards.
#[derive(Debug)]
pub struct WorkflowBookmarksIndexed {
    pub context: WorkflowExecutionContext,
    pub indexed_bookmarks: IndexedWorkflowBookmarks,
}

impl Notification for WorkflowBookmarksIndexed {}
