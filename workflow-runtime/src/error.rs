use workflow_core::WorkflowError;
use workflow_core::primitives::BookmarkId;
use workflow_persistence::BackendError;

use crate::scheduler::SchedulerError;

/// Failure of the background activity indexing step. Every variant aborts the turn.
#[derive(Debug, thiserror::Error)]
pub enum IndexingError {
    /// A background activity refers to a bookmark the context does not hold.
    #[error("Bookmark {bookmark_id} referenced by a background activity is missing")]
    Consistency { bookmark_id: BookmarkId },
    #[error("Failed to schedule background activity for bookmark {bookmark_id}: {source}")]
    Scheduling {
        bookmark_id: BookmarkId,
        #[source]
        source: SchedulerError,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Store(#[from] BackendError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Failure of a host operation.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Store(#[from] BackendError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A behavior or notification handler failed during the turn.
    #[error(transparent)]
    Turn(#[from] anyhow::Error),
}
