//! In-memory implementation of PersistentBackend.
//!
//! Stores snapshots and bookmarks in HashMaps behind locks.
//! Useful for testing and as a reference implementation.

use crate::backend::{BackendError, PersistentBackend};
use crate::stored::StoredBookmark;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use workflow_core::primitives::BookmarkId;
use workflow_core::snapshot::WorkflowInstanceSnapshot;

type BookmarkKey = (String, BookmarkId);

/// In-memory backend.
///
/// This implementation is thread-safe and suitable for testing.
/// For production use, implement PersistentBackend for a durable store.
///
/// # Example
///
/// ```rust,ignore
/// use workflow_persistence::{InMemoryBackend, PersistentBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.import_workflow_state(snapshot).await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    snapshots: Arc<RwLock<HashMap<String, WorkflowInstanceSnapshot>>>,
    bookmarks: Arc<RwLock<HashMap<BookmarkKey, StoredBookmark>>>,
}

impl InMemoryBackend {
    /// Create a new in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error(e: impl std::fmt::Display) -> BackendError {
        BackendError::Backend(format!("Lock error: {}", e))
    }
}

#[async_trait]
impl PersistentBackend for InMemoryBackend {
    async fn import_workflow_state(
        &self,
        snapshot: WorkflowInstanceSnapshot,
    ) -> Result<(), BackendError> {
        let mut snapshots = self.snapshots.write().map_err(Self::lock_error)?;
        if let Some(stored) = snapshots.get(&snapshot.instance_id) {
            if stored.version > snapshot.version {
                return Err(BackendError::StaleVersion {
                    instance_id: snapshot.instance_id.clone(),
                    stored: stored.version,
                    incoming: snapshot.version,
                });
            }
        }
        snapshots.insert(snapshot.instance_id.clone(), snapshot);
        Ok(())
    }

    async fn load_snapshot(
        &self,
        instance_id: &str,
    ) -> Result<WorkflowInstanceSnapshot, BackendError> {
        let snapshots = self.snapshots.read().map_err(Self::lock_error)?;
        snapshots
            .get(instance_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(instance_id.to_string()))
    }

    async fn delete_snapshot(&self, instance_id: &str) -> Result<(), BackendError> {
        {
            let mut snapshots = self.snapshots.write().map_err(Self::lock_error)?;
            snapshots
                .remove(instance_id)
                .ok_or_else(|| BackendError::NotFound(instance_id.to_string()))?;
        }
        let mut bookmarks = self.bookmarks.write().map_err(Self::lock_error)?;
        bookmarks.retain(|(owner, _), _| owner != instance_id);
        Ok(())
    }

    async fn list_snapshots(&self) -> Result<Vec<String>, BackendError> {
        let snapshots = self.snapshots.read().map_err(Self::lock_error)?;
        Ok(snapshots.keys().cloned().collect())
    }

    async fn update_bookmark(&self, bookmark: StoredBookmark) -> Result<(), BackendError> {
        let mut bookmarks = self.bookmarks.write().map_err(Self::lock_error)?;
        let key = (bookmark.instance_id.clone(), bookmark.bookmark_id.clone());
        bookmarks.insert(key, bookmark);
        Ok(())
    }

    async fn remove_bookmark(
        &self,
        instance_id: &str,
        bookmark_id: &BookmarkId,
    ) -> Result<Option<StoredBookmark>, BackendError> {
        let mut bookmarks = self.bookmarks.write().map_err(Self::lock_error)?;
        Ok(bookmarks.remove(&(instance_id.to_string(), bookmark_id.clone())))
    }

    async fn find_bookmarks(&self, hash: &str) -> Result<Vec<StoredBookmark>, BackendError> {
        let bookmarks = self.bookmarks.read().map_err(Self::lock_error)?;
        Ok(bookmarks
            .values()
            .filter(|b| b.hash == hash)
            .cloned()
            .collect())
    }

    async fn list_bookmarks(
        &self,
        instance_id: &str,
    ) -> Result<Vec<StoredBookmark>, BackendError> {
        let bookmarks = self.bookmarks.read().map_err(Self::lock_error)?;
        Ok(bookmarks
            .values()
            .filter(|b| b.instance_id == instance_id)
            .cloned()
            .collect())
    }
}
