//! Bookmark delta computation.

use workflow_core::bookmark::{Bookmark, BookmarkSet};

/// Bookmarks of one instance, split by what happened to them during a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedWorkflowBookmarks {
    pub added: Vec<Bookmark>,
    pub removed: Vec<Bookmark>,
    pub unchanged: Vec<Bookmark>,
}

impl IndexedWorkflowBookmarks {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Diffs the bookmark set at the start of a turn against the set at its end.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookmarkIndexer;

impl BookmarkIndexer {
    /// A bookmark whose hash changed is reported as removed (old value) and
    /// added (new value), so stores keyed by hash drop the stale entry.
    pub fn index(&self, previous: &BookmarkSet, current: &BookmarkSet) -> IndexedWorkflowBookmarks {
        let mut indexed = IndexedWorkflowBookmarks::default();

        for bookmark in current.iter() {
            match previous.find(&bookmark.id) {
                Some(before) if before.hash() == bookmark.hash() => {
                    indexed.unchanged.push(bookmark.clone())
                }
                Some(before) => {
                    indexed.removed.push(before.clone());
                    indexed.added.push(bookmark.clone());
                }
                None => indexed.added.push(bookmark.clone()),
            }
        }
        indexed.removed.extend(
            previous
                .iter()
                .filter(|before| !current.contains(&before.id))
                .cloned(),
        );

        indexed
    }
}
