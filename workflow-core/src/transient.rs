//! Per-turn scratch state attached to execution contexts.
//!
//! Nothing in here is serialized. The host clears it at every turn boundary.

use crate::background::ScheduledBackgroundActivity;
use std::collections::HashMap;

/// Values that may be stored in the string-keyed part of the property bag.
#[derive(Debug, Clone, PartialEq)]
pub enum TransientValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransientProperties {
    background_activities: Vec<ScheduledBackgroundActivity>,
    values: HashMap<String, TransientValue>,
}

impl TransientProperties {
    /// Queue a background activity for the bookmark indexing handler.
    pub fn schedule_background_activity(&mut self, activity: ScheduledBackgroundActivity) {
        self.background_activities.push(activity);
    }

    pub fn background_activities(&self) -> &[ScheduledBackgroundActivity] {
        &self.background_activities
    }

    pub fn clear_background_activities(&mut self) {
        self.background_activities.clear();
    }

    pub fn insert(&mut self, key: impl Into<String>, value: TransientValue) -> Option<TransientValue> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&TransientValue> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<TransientValue> {
        self.values.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.background_activities.is_empty() && self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.background_activities.clear();
        self.values.clear();
    }
}
