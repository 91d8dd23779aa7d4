//! Workflow instance snapshots for durable storage and recovery.
//!
//! A snapshot captures the durable part of a [`WorkflowExecutionContext`]: the
//! activity tree, the bookmarks, the version and the input. Snapshots are
//! written at turn boundaries and never modified afterwards; the next turn
//! produces a new snapshot with a higher version.

use crate::activity::ActivityExecutionContext;
use crate::bookmark::BookmarkSet;
use crate::codec::{Codec, sealed};
use crate::context::WorkflowExecutionContext;
use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serialized execution tree of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub id: String,
    pub definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub activities: Vec<ActivityExecutionContext>,
    pub bookmarks: BookmarkSet,
}

/// The durable unit for one workflow instance at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstanceSnapshot {
    pub definition_id: String,
    pub instance_id: String,
    pub version: u64,
    pub workflow_state: WorkflowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<HashMap<String, serde_json::Value>>,
}

impl WorkflowInstanceSnapshot {
    /// Transcribe the durable state of `context`.
    pub fn capture(context: &WorkflowExecutionContext) -> Self {
        Self {
            definition_id: context.definition_id().to_string(),
            instance_id: context.id().to_string(),
            version: context.version(),
            workflow_state: WorkflowState {
                id: context.id().to_string(),
                definition_id: context.definition_id().to_string(),
                correlation_id: context.correlation_id().map(str::to_string),
                activities: context.activities().to_vec(),
                bookmarks: context.bookmarks().clone(),
            },
            input: context.input().cloned(),
        }
    }

    pub fn encode<C>(&self, codec: &C) -> Result<Bytes>
    where
        C: Codec + sealed::EncodeValue<Self>,
    {
        codec.encode(self)
    }

    pub fn decode<C>(codec: &C, bytes: &[u8]) -> Result<Self>
    where
        C: Codec + sealed::DecodeValue<Self>,
    {
        codec.decode(bytes)
    }
}

/// Turns an execution context into a snapshot.
///
/// Injected into anything that persists workflow state so that alternative
/// transcriptions (validation, redaction, encoding checks) can be plugged in.
pub trait WorkflowStateSerializer: Send + Sync {
    fn serialize_state(&self, context: &WorkflowExecutionContext)
    -> Result<WorkflowInstanceSnapshot>;
}

/// Plain structural transcription.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotSerializer;

impl WorkflowStateSerializer for SnapshotSerializer {
    fn serialize_state(
        &self,
        context: &WorkflowExecutionContext,
    ) -> Result<WorkflowInstanceSnapshot> {
        Ok(WorkflowInstanceSnapshot::capture(context))
    }
}
