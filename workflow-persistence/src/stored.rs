use bytes::Bytes;
use serde::{Deserialize, Serialize};
use workflow_core::bookmark::Bookmark;
use workflow_core::primitives::{ActivityInstanceId, BookmarkId};

/// A bookmark as kept in the durable bookmark store.
///
/// Stored bookmarks are looked up independently of workflow state, by hash, to
/// match incoming external triggers quickly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBookmark {
    pub name: String,
    pub hash: String,
    pub instance_id: String,
    pub bookmark_id: BookmarkId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    pub activity_instance_id: ActivityInstanceId,
}

impl StoredBookmark {
    pub fn from_bookmark(
        bookmark: &Bookmark,
        instance_id: &str,
        correlation_id: Option<&str>,
    ) -> Self {
        Self {
            name: bookmark.name.clone(),
            hash: bookmark.hash().to_string(),
            instance_id: instance_id.to_string(),
            bookmark_id: bookmark.id.clone(),
            correlation_id: correlation_id.map(str::to_string),
            payload: bookmark.payload().to_vec(),
            activity_instance_id: bookmark.activity_instance_id.clone(),
        }
    }

    pub fn payload_bytes(&self) -> Bytes {
        Bytes::from(self.payload.clone())
    }
}
