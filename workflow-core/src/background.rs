//! Background activity requests and the bookmark payload that tracks them.

use crate::primitives::{ActivityId, ActivityInstanceId, BookmarkId, JobId};
use serde::{Deserialize, Serialize};

/// Bookmark name used for activities that suspend while their work runs out-of-band.
pub const BACKGROUND_ACTIVITY_BOOKMARK: &str = "BackgroundActivity";

/// A request to run an activity outside the current turn.
///
/// Requests live in the transient properties of the execution context until
/// the bookmark indexing handler consumes them. They are never persisted; only
/// the updated bookmark is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledBackgroundActivity {
    pub workflow_instance_id: String,
    pub activity_id: ActivityId,
    pub activity_instance_id: ActivityInstanceId,
    /// The bookmark this job resolves when it finishes.
    pub bookmark_id: BookmarkId,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub input: serde_json::Value,
}

/// Payload of a background-activity bookmark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundActivityBookmark {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}
