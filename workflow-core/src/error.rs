//! Error types for workflow-core.

use crate::activity::ActivityStatus;
use crate::primitives::{ActivityInstanceId, BookmarkId};

/// Unified error type for execution-context operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A bookmark was expected in the execution context but is missing.
    ///
    /// This is a consistency fault: the bookmark is created when the activity
    /// suspends, so its absence means the context was corrupted or replaced.
    #[error("Bookmark '{0}' not found in execution context")]
    BookmarkNotFound(BookmarkId),
    /// A referenced activity instance is not part of the execution tree.
    #[error("Activity instance '{0}' not found in execution tree")]
    ActivityNotFound(ActivityInstanceId),
    /// The activity cannot move from its current status to the requested one.
    #[error("Activity instance '{id}' cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        id: ActivityInstanceId,
        from: ActivityStatus,
        to: ActivityStatus,
    },
}
