//! Nodes of the execution tree.

use crate::primitives::{ActivityId, ActivityInstanceId};
use crate::transient::TransientProperties;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityStatus {
    Pending,
    Running,
    /// Waiting on one or more bookmarks.
    Suspended,
    Completed,
    Faulted,
}

impl ActivityStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActivityStatus::Completed | ActivityStatus::Faulted)
    }
}

/// One execution of an activity.
///
/// The parent link is an id into the owning
/// [`WorkflowExecutionContext`](crate::context::WorkflowExecutionContext); the
/// context owns every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityExecutionContext {
    pub id: ActivityInstanceId,
    pub activity_id: ActivityId,
    pub parent_id: Option<ActivityInstanceId>,
    pub status: ActivityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip)]
    pub properties: TransientProperties,
}

impl ActivityExecutionContext {
    pub fn new(activity_id: ActivityId, parent_id: Option<ActivityInstanceId>) -> Self {
        Self {
            id: ActivityInstanceId::generate(),
            activity_id,
            parent_id,
            status: ActivityStatus::Pending,
            fault: None,
            result: None,
            properties: TransientProperties::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
