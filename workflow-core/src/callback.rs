//! Completion callbacks: continuations a parent registers for a child it schedules.

use crate::context::WorkflowExecutionContext;
use crate::primitives::{ActivityId, ActivityInstanceId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Describes the child completion a callback is invoked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCompletion {
    /// The activity instance that registered the callback.
    pub owner: ActivityInstanceId,
    /// The activity instance that just completed.
    pub child: ActivityInstanceId,
    pub child_activity_id: ActivityId,
}

/// A continuation invoked when a scheduled child completes.
#[async_trait]
pub trait CompletionCallback: Send + Sync {
    async fn on_child_completed(
        &self,
        context: &mut WorkflowExecutionContext,
        completion: &ChildCompletion,
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> CompletionCallback for F
where
    F: Fn(&mut WorkflowExecutionContext, &ChildCompletion) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_child_completed(
        &self,
        context: &mut WorkflowExecutionContext,
        completion: &ChildCompletion,
    ) -> anyhow::Result<()> {
        self(context, completion)
    }
}

/// Table of pending continuations keyed by (owner instance, child activity).
///
/// Entries live for one turn. Each entry is popped at most once.
#[derive(Clone, Default)]
pub struct CompletionCallbacks {
    entries: HashMap<(ActivityInstanceId, ActivityId), Arc<dyn CompletionCallback>>,
}

impl CompletionCallbacks {
    /// Store `callback` for the pair. A previous entry for the same pair is
    /// replaced and returned.
    pub fn register(
        &mut self,
        owner: ActivityInstanceId,
        child: ActivityId,
        callback: Arc<dyn CompletionCallback>,
    ) -> Option<Arc<dyn CompletionCallback>> {
        self.entries.insert((owner, child), callback)
    }

    /// Remove and return the continuation for the pair, if any.
    pub fn pop(
        &mut self,
        owner: &ActivityInstanceId,
        child: &ActivityId,
    ) -> Option<Arc<dyn CompletionCallback>> {
        self.entries.remove(&(owner.clone(), child.clone()))
    }

    pub fn contains(&self, owner: &ActivityInstanceId, child: &ActivityId) -> bool {
        self.entries.contains_key(&(owner.clone(), child.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for CompletionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionCallbacks")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn CompletionCallback> {
        Arc::new(
            |_: &mut WorkflowExecutionContext, _: &ChildCompletion| -> anyhow::Result<()> { Ok(()) },
        )
    }

    #[test]
    fn test_pop_returns_entry_once() {
        let mut callbacks = CompletionCallbacks::default();
        let owner = ActivityInstanceId::new("seq-1");
        let child = ActivityId::new("step");

        callbacks.register(owner.clone(), child.clone(), noop());
        assert!(callbacks.pop(&owner, &child).is_some());
        assert!(callbacks.pop(&owner, &child).is_none());
        assert!(callbacks.is_empty());
    }

    #[test]
    fn test_register_overwrites_same_pair() {
        let mut callbacks = CompletionCallbacks::default();
        let owner = ActivityInstanceId::new("loop-1");
        let child = ActivityId::new("body");

        assert!(callbacks.register(owner.clone(), child.clone(), noop()).is_none());
        assert!(callbacks.register(owner.clone(), child.clone(), noop()).is_some());
        assert_eq!(callbacks.len(), 1);
    }

    #[test]
    fn test_pop_unknown_pair_is_none() {
        let mut callbacks = CompletionCallbacks::default();
        assert!(
            callbacks
                .pop(&ActivityInstanceId::new("x"), &ActivityId::new("y"))
                .is_none()
        );
    }
}
