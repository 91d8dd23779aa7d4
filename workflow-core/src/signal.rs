//! Signals and behaviors.
//!
//! Behaviors are attached to activities of the definition and declare, at
//! construction, which signal kinds they react to. When a signal is raised from
//! an activity instance, the [`SignalDispatcher`] walks from that instance up to
//! the root and hands the signal to every behavior attached to each node, in
//! subscription order. A behavior can stop propagation to further ancestors.

use crate::activity::ActivityStatus;
use crate::callback::ChildCompletion;
use crate::context::WorkflowExecutionContext;
use crate::primitives::{ActivityId, ActivityInstanceId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    ActivityCompleted,
    ActivityFaulted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    ActivityCompleted { result: Option<serde_json::Value> },
    ActivityFaulted { error: String },
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::ActivityCompleted { .. } => SignalKind::ActivityCompleted,
            Signal::ActivityFaulted { .. } => SignalKind::ActivityFaulted,
        }
    }
}

/// Delivery information for one behavior invocation.
#[derive(Debug, Clone)]
pub struct SignalContext {
    /// The activity instance whose behavior is receiving the signal.
    pub receiver: ActivityInstanceId,
    /// The activity instance the signal was raised from.
    pub source: ActivityInstanceId,
    stopped: bool,
}

impl SignalContext {
    pub fn new(receiver: ActivityInstanceId, source: ActivityInstanceId) -> Self {
        Self {
            receiver,
            source,
            stopped: false,
        }
    }

    /// Deliver to the remaining behaviors of this node, but not to ancestors.
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_from_self(&self) -> bool {
        self.receiver == self.source
    }
}

/// Reactive logic attached to an activity.
#[async_trait]
pub trait Behavior: Send + Sync {
    fn name(&self) -> &str;

    /// Signal kinds this behavior subscribes to.
    fn subscriptions(&self) -> &[SignalKind];

    async fn on_signal(
        &self,
        context: &mut WorkflowExecutionContext,
        signal: &Signal,
        signal_context: &mut SignalContext,
    ) -> anyhow::Result<()>;
}

/// Registry of behaviors keyed by (owner activity, signal kind).
#[derive(Clone, Default)]
pub struct SignalDispatcher {
    behaviors: HashMap<(ActivityId, SignalKind), Vec<Arc<dyn Behavior>>>,
}

impl SignalDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `behavior` to `owner` for every kind it subscribes to.
    pub fn attach(&mut self, owner: ActivityId, behavior: Arc<dyn Behavior>) {
        for kind in behavior.subscriptions() {
            self.behaviors
                .entry((owner.clone(), *kind))
                .or_default()
                .push(Arc::clone(&behavior));
        }
    }

    #[must_use]
    pub fn with_behavior(mut self, owner: impl Into<ActivityId>, behavior: Arc<dyn Behavior>) -> Self {
        self.attach(owner.into(), behavior);
        self
    }

    pub fn behaviors_for(&self, owner: &ActivityId, kind: SignalKind) -> &[Arc<dyn Behavior>] {
        self.behaviors
            .get(&(owner.clone(), kind))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Deliver `signal` raised by `source` to the source and each ancestor.
    ///
    /// A failing behavior aborts delivery and returns its error. Nothing that
    /// earlier behaviors did is rolled back.
    pub async fn dispatch(
        &self,
        context: &mut WorkflowExecutionContext,
        source: &ActivityInstanceId,
        signal: &Signal,
    ) -> anyhow::Result<()> {
        let kind = signal.kind();
        let mut path = vec![source.clone()];
        path.extend(context.ancestors(source)?);

        for receiver in path {
            let owner = context.require_activity(&receiver)?.activity_id.clone();
            let behaviors = self.behaviors_for(&owner, kind);
            if behaviors.is_empty() {
                continue;
            }

            let mut signal_context = SignalContext::new(receiver.clone(), source.clone());
            for behavior in behaviors {
                tracing::trace!(
                    instance_id = %context.id(),
                    receiver = %receiver,
                    source = %source,
                    behavior = behavior.name(),
                    "Delivering signal"
                );
                behavior
                    .on_signal(context, signal, &mut signal_context)
                    .await?;
            }
            if signal_context.is_propagation_stopped() {
                break;
            }
        }
        Ok(())
    }

    /// Mark `id` completed and raise [`Signal::ActivityCompleted`] from it.
    pub async fn complete_activity(
        &self,
        context: &mut WorkflowExecutionContext,
        id: &ActivityInstanceId,
        result: Option<serde_json::Value>,
    ) -> anyhow::Result<()> {
        context.set_status(id, ActivityStatus::Completed)?;
        if let Some(activity) = context.activity_mut(id) {
            activity.result = result.clone();
        }
        self.dispatch(context, id, &Signal::ActivityCompleted { result })
            .await
    }

    /// Mark `id` faulted and raise [`Signal::ActivityFaulted`] from it.
    pub async fn fault_activity(
        &self,
        context: &mut WorkflowExecutionContext,
        id: &ActivityInstanceId,
        error: impl Into<String>,
    ) -> anyhow::Result<()> {
        let error = error.into();
        context.set_status(id, ActivityStatus::Faulted)?;
        if let Some(activity) = context.activity_mut(id) {
            activity.fault = Some(error.clone());
        }
        self.dispatch(context, id, &Signal::ActivityFaulted { error })
            .await
    }
}

/// Invokes the completion callback a parent registered for the child that just completed.
///
/// Attach it to every activity that schedules children (sequences, parallels,
/// loops). A missing entry is expected for children scheduled without a
/// continuation and is ignored.
///
/// Callbacks live for one turn only: [`WorkflowExecutionContext::end_turn`]
/// drops them and they are not part of the snapshot. A child that suspends
/// (on a background job, say) and completes in a later turn therefore does
/// not reach its parent's callback unless the parent registers it again with
/// [`WorkflowExecutionContext::register_completion_callback`] after the
/// instance is loaded.
#[derive(Debug, Default)]
pub struct ScheduledChildCallbackBehavior;

const CHILD_CALLBACK_SUBSCRIPTIONS: &[SignalKind] = &[SignalKind::ActivityCompleted];

#[async_trait]
impl Behavior for ScheduledChildCallbackBehavior {
    fn name(&self) -> &str {
        "scheduled-child-callback"
    }

    fn subscriptions(&self) -> &[SignalKind] {
        CHILD_CALLBACK_SUBSCRIPTIONS
    }

    async fn on_signal(
        &self,
        context: &mut WorkflowExecutionContext,
        _signal: &Signal,
        signal_context: &mut SignalContext,
    ) -> anyhow::Result<()> {
        if signal_context.is_from_self() {
            return Ok(());
        }

        let child_activity_id = context
            .require_activity(&signal_context.source)?
            .activity_id
            .clone();
        let Some(callback) =
            context.pop_completion_callback(&signal_context.receiver, &child_activity_id)
        else {
            return Ok(());
        };

        let completion = ChildCompletion {
            owner: signal_context.receiver.clone(),
            child: signal_context.source.clone(),
            child_activity_id,
        };
        callback.on_child_completed(context, &completion).await
    }
}
