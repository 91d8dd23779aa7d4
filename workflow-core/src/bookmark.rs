//! Bookmarks: durable records of where a workflow instance is suspended.
//!
//! A bookmark is matched against incoming external triggers by its hash, which
//! is derived from the bookmark name and its serialized payload. The payload and
//! the hash are private to this module so that they can only change together.

use crate::error::WorkflowError;
use crate::primitives::{ActivityId, ActivityInstanceId, BookmarkId};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Derives the stable matching hash of a bookmark.
pub trait BookmarkHasher: Send + Sync {
    fn hash(&self, name: &str, payload: &[u8]) -> String;
}

/// Hex-encoded SHA-256 over `name || 0x00 || payload`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256BookmarkHasher;

impl BookmarkHasher for Sha256BookmarkHasher {
    fn hash(&self, name: &str, payload: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(payload);
        hex::encode(hasher.finalize())
    }
}

/// A suspension point of a workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Identifier, unique within the owning workflow instance.
    pub id: BookmarkId,
    /// The kind of event awaited.
    pub name: String,
    hash: String,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
    /// Definition node of the suspended activity.
    pub activity_id: ActivityId,
    /// Execution node that created the bookmark.
    pub activity_instance_id: ActivityInstanceId,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    /// Create a bookmark with a freshly generated id.
    pub fn new(
        name: impl Into<String>,
        payload: Bytes,
        hasher: &dyn BookmarkHasher,
        activity_id: ActivityId,
        activity_instance_id: ActivityInstanceId,
    ) -> Self {
        let name = name.into();
        let hash = hasher.hash(&name, &payload);
        Self {
            id: BookmarkId::generate(),
            name,
            hash,
            payload: payload.to_vec(),
            activity_id,
            activity_instance_id,
            created_at: Utc::now(),
        }
    }

    /// Return a copy of this bookmark carrying `payload`, with the hash re-derived.
    ///
    /// The original is left untouched; callers swap the new value into the
    /// owning [`BookmarkSet`].
    #[must_use]
    pub fn with_payload(&self, payload: Bytes, hasher: &dyn BookmarkHasher) -> Self {
        Self {
            hash: hasher.hash(&self.name, &payload),
            payload: payload.to_vec(),
            ..self.clone()
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_bytes(&self) -> Bytes {
        Bytes::from(self.payload.clone())
    }

    /// Check that the stored hash still matches name and payload.
    pub fn is_consistent(&self, hasher: &dyn BookmarkHasher) -> bool {
        hasher.hash(&self.name, &self.payload) == self.hash
    }
}

/// Insertion-ordered set of bookmarks keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkSet(Vec<Bookmark>);

impl BookmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bookmark. An existing bookmark with the same id is dropped first.
    pub fn add(&mut self, bookmark: Bookmark) {
        self.0.retain(|b| b.id != bookmark.id);
        self.0.push(bookmark);
    }

    pub fn remove(&mut self, id: &BookmarkId) -> Option<Bookmark> {
        let index = self.0.iter().position(|b| &b.id == id)?;
        Some(self.0.remove(index))
    }

    /// Swap the bookmark `id` for `replacement` (remove, then add).
    ///
    /// Returns the replaced value.
    pub fn replace(
        &mut self,
        id: &BookmarkId,
        replacement: Bookmark,
    ) -> Result<Bookmark, WorkflowError> {
        let previous = self
            .remove(id)
            .ok_or_else(|| WorkflowError::BookmarkNotFound(id.clone()))?;
        self.add(replacement);
        Ok(previous)
    }

    pub fn find(&self, id: &BookmarkId) -> Option<&Bookmark> {
        self.0.iter().find(|b| &b.id == id)
    }

    pub fn contains(&self, id: &BookmarkId) -> bool {
        self.find(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bookmark> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Bookmark> for BookmarkSet {
    fn from_iter<I: IntoIterator<Item = Bookmark>>(iter: I) -> Self {
        let mut set = BookmarkSet::new();
        for bookmark in iter {
            set.add(bookmark);
        }
        set
    }
}
