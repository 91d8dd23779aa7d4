//! Persistent backend trait for workflow snapshots and bookmarks.
//!
//! This trait abstracts the storage mechanism, allowing implementations
//! for various backends (in-memory, Redis, PostgreSQL, etc.).

use crate::stored::StoredBookmark;
use async_trait::async_trait;
use workflow_core::primitives::BookmarkId;
use workflow_core::snapshot::WorkflowInstanceSnapshot;

/// Error type for backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Snapshot not found.
    #[error("Snapshot not found: {0}")]
    NotFound(String),
    /// The incoming snapshot is older than the stored one.
    #[error("Stale snapshot for '{instance_id}': stored version {stored}, incoming {incoming}")]
    StaleVersion {
        instance_id: String,
        stored: u64,
        incoming: u64,
    },
    /// Backend-specific error.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Durable storage for workflow state and bookmarks.
///
/// Workflow state and bookmarks are written separately: bookmarks are read on
/// their own for trigger matching, full state is read for recovery. The two
/// writes are not atomic with each other; callers reconcile on load.
///
/// Implementations must be safe to share between instances running in
/// parallel. Calls for one instance are never concurrent.
///
/// # Example
///
/// ```rust,ignore
/// use workflow_persistence::{InMemoryBackend, PersistentBackend};
/// use workflow_core::snapshot::WorkflowInstanceSnapshot;
///
/// let backend = InMemoryBackend::new();
/// backend.import_workflow_state(WorkflowInstanceSnapshot::capture(&context)).await?;
/// let restored = backend.load_snapshot("instance-123").await?;
/// ```
#[async_trait]
pub trait PersistentBackend: Send + Sync {
    /// Store `snapshot` as the current state of its instance.
    ///
    /// A snapshot with the same version replaces the stored one.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::StaleVersion` if a newer version is already stored.
    async fn import_workflow_state(
        &self,
        snapshot: WorkflowInstanceSnapshot,
    ) -> Result<(), BackendError>;

    /// Load the latest snapshot of an instance.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if no snapshot exists for the given instance ID.
    async fn load_snapshot(&self, instance_id: &str)
    -> Result<WorkflowInstanceSnapshot, BackendError>;

    /// Delete the snapshot and all stored bookmarks of an instance.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if no snapshot exists for the given instance ID.
    async fn delete_snapshot(&self, instance_id: &str) -> Result<(), BackendError>;

    /// List all instance IDs with a stored snapshot.
    async fn list_snapshots(&self) -> Result<Vec<String>, BackendError>;

    /// Insert or overwrite a stored bookmark, keyed by instance and bookmark id.
    async fn update_bookmark(&self, bookmark: StoredBookmark) -> Result<(), BackendError>;

    /// Remove a stored bookmark. Returns the removed value, if there was one.
    async fn remove_bookmark(
        &self,
        instance_id: &str,
        bookmark_id: &BookmarkId,
    ) -> Result<Option<StoredBookmark>, BackendError>;

    /// Stored bookmarks whose hash equals `hash`, across all instances.
    async fn find_bookmarks(&self, hash: &str) -> Result<Vec<StoredBookmark>, BackendError>;

    /// Stored bookmarks of one instance.
    async fn list_bookmarks(&self, instance_id: &str)
    -> Result<Vec<StoredBookmark>, BackendError>;
}
