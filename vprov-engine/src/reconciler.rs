//! Reconciler - compares desired state with the remote system and converges.
//!
//! One run is a single strict sequence: observe, select a transition from
//! the table, apply the matching action, then wait for any asynchronous
//! remote process the action started. The first error ends the run; nothing
//! is retried or rolled back.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::backend::{Action, ActionResult, Probe, Readiness};
use crate::config::ReconcileConfig;
use crate::context::RunContext;
use crate::error::{ConfigError, ReconcileError, RemoteError, Result};
use crate::outcome::Outcome;
use crate::state::{
    Attributes, DesiredLifecycle, DesiredStateSpec, ObservedLifecycle, ObservedState,
    TargetIdentity,
};
use crate::transition::{Transition, TransitionTable};
use crate::waiter::CancelSignal;

/// What a run would do, without doing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub target: TargetIdentity,
    pub desired: DesiredLifecycle,
    pub observed: ObservedLifecycle,
    pub transition: Transition,
    /// Attributes the selected transition would send.
    pub changes: Attributes,
    pub observed_attributes: Attributes,
}

/// Reconciles one resource type through an injected probe and action.
///
/// Holds no state between runs: every `reconcile` or `plan` call builds a
/// fresh [`RunContext`] and observation.
pub struct Reconciler<P, A> {
    probe: P,
    action: A,
    config: ReconcileConfig,
    table: TransitionTable,
    cancel: CancelSignal,
}

impl<P, A> Reconciler<P, A>
where
    P: Probe,
    A: Action<Handle = P::Handle>,
{
    pub fn new(probe: P, action: A) -> Self {
        Self {
            probe,
            action,
            config: ReconcileConfig::default(),
            table: TransitionTable::standard(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_config(mut self, config: ReconcileConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn action(&self) -> &A {
        &self.action
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    fn context(&self) -> RunContext {
        RunContext::new(self.config.clone(), self.cancel.clone())
    }

    /// Observe the target and classify it against `spec`.
    pub async fn observe(&self, spec: &DesiredStateSpec) -> Result<ObservedState<P::Handle>> {
        let ctx = self.context();
        self.observe_with(&ctx, spec).await
    }

    async fn observe_with(
        &self,
        ctx: &RunContext,
        spec: &DesiredStateSpec,
    ) -> Result<ObservedState<P::Handle>> {
        let observation = ctx
            .bounded(
                "observe",
                self.probe.observe(ctx, &spec.target, &spec.attributes),
            )
            .await?;
        let observed = ObservedState::classify(observation, spec, &ctx.config().diff);
        debug!(
            run = %ctx.run_id(),
            target = %spec.target,
            observed = %observed.lifecycle,
            drift = observed.drift.changed.len(),
            "Observed"
        );
        Ok(observed)
    }

    /// Check mode: observe and select a transition without acting.
    pub async fn plan(&self, spec: &DesiredStateSpec) -> Result<Plan> {
        let ctx = self.context();
        let observed = self.observe_with(&ctx, spec).await?;
        let transition = select(&self.table, spec.lifecycle, &observed);
        let changes = match transition {
            Transition::Create => spec.attributes.clone(),
            Transition::Update => observed.drift.changed.clone(),
            Transition::UpdatePartial => observed.drift.additions.clone(),
            _ => Attributes::new(),
        };
        info!(
            run = %ctx.run_id(),
            target = %spec.target,
            transition = %transition,
            "Planned"
        );
        Ok(Plan {
            target: spec.target.clone(),
            desired: spec.lifecycle,
            observed: observed.lifecycle,
            transition,
            changes,
            observed_attributes: observed.attributes,
        })
    }

    /// Converge the remote resource towards `spec`.
    pub async fn reconcile(&self, spec: &DesiredStateSpec) -> Outcome {
        let ctx = self.context();
        info!(
            run = %ctx.run_id(),
            target = %spec.target,
            desired = %spec.lifecycle,
            "Reconciling"
        );

        let observed = match self.observe_with(&ctx, spec).await {
            Ok(o) => o,
            Err(e) => {
                error!(run = %ctx.run_id(), target = %spec.target, error = %e, "Observe failed");
                return Outcome::failed(e);
            }
        };

        let transition = select(&self.table, spec.lifecycle, &observed);
        info!(
            run = %ctx.run_id(),
            target = %spec.target,
            observed = %observed.lifecycle,
            transition = %transition,
            "Selected transition"
        );

        let applied = match self.apply(&ctx, spec, transition, &observed).await {
            Ok(a) => a,
            Err(e) => {
                error!(run = %ctx.run_id(), target = %spec.target, error = %e, "Transition failed");
                return Outcome::failed(e);
            }
        };

        for pending in &applied.pending {
            if let Err(e) = self.await_pending(&ctx, pending.as_ref()).await {
                error!(run = %ctx.run_id(), target = %spec.target, error = %e, "Wait failed");
                return Outcome::partially_applied(applied.changed, applied.result, e);
            }
        }

        info!(
            run = %ctx.run_id(),
            target = %spec.target,
            changed = applied.changed,
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "Reconciled"
        );
        Outcome::succeeded(applied.changed, applied.result)
    }

    async fn apply(
        &self,
        ctx: &RunContext,
        spec: &DesiredStateSpec,
        transition: Transition,
        observed: &ObservedState<P::Handle>,
    ) -> Result<ActionResult> {
        match transition {
            Transition::NoOp => Ok(ActionResult::unchanged(observed.snapshot())),
            Transition::Unsupported => Err(ReconcileError::UnsupportedTransition {
                desired: spec.lifecycle,
                observed: observed.lifecycle,
            }),
            Transition::Create => {
                ensure_not_cancelled(ctx, transition)?;
                info!(run = %ctx.run_id(), target = %spec.target, "Creating");
                match ctx
                    .bounded(
                        "create",
                        self.action.create(ctx, &spec.target, &spec.attributes),
                    )
                    .await
                {
                    Ok(r) => Ok(r),
                    Err(RemoteError::AlreadyExists(msg)) => {
                        Err(ReconcileError::DuplicateResource(msg))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Transition::Delete => {
                ensure_not_cancelled(ctx, transition)?;
                let handle = require_handle(observed)?;
                info!(run = %ctx.run_id(), target = %spec.target, "Deleting");
                match ctx.bounded("delete", self.action.delete(ctx, handle)).await {
                    Ok(r) => Ok(r),
                    // Vanished between observe and delete: already converged.
                    Err(RemoteError::NotFound(msg)) => {
                        warn!(run = %ctx.run_id(), target = %spec.target, %msg, "Already gone");
                        Ok(ActionResult::unchanged(Value::Null))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Transition::Update => {
                ensure_not_cancelled(ctx, transition)?;
                let handle = require_handle(observed)?;
                let changes = &observed.drift.changed;
                info!(
                    run = %ctx.run_id(),
                    target = %spec.target,
                    attributes = ?changes.keys().collect::<Vec<_>>(),
                    "Updating"
                );
                Ok(ctx
                    .bounded("update", self.action.update(ctx, handle, changes))
                    .await?)
            }
            Transition::UpdatePartial => {
                ensure_not_cancelled(ctx, transition)?;
                let handle = require_handle(observed)?;
                let additions = &observed.drift.additions;
                info!(
                    run = %ctx.run_id(),
                    target = %spec.target,
                    attributes = ?additions.keys().collect::<Vec<_>>(),
                    "Adding missing members"
                );
                Ok(ctx
                    .bounded(
                        "update",
                        self.action
                            .update_partial(ctx, handle, additions, &observed.attributes),
                    )
                    .await?)
            }
        }
    }

    async fn await_pending(&self, ctx: &RunContext, pending: &dyn Readiness) -> Result<()> {
        let what = pending.describe();
        let poll = ctx.wait_for(pending).await?;
        if poll.cancelled {
            return Err(ReconcileError::Cancelled(format!("waiting for {}", what)));
        }
        if !poll.succeeded {
            return Err(ReconcileError::PollTimeout {
                what,
                attempts: poll.attempts_used,
            });
        }
        Ok(())
    }
}

impl<B> Reconciler<B, B>
where
    B: Probe + Action<Handle = <B as Probe>::Handle> + Clone,
{
    /// Use one backend value as both probe and action.
    pub fn for_backend(backend: B) -> Self {
        Self::new(backend.clone(), backend)
    }
}

/// Table transition adjusted to the drift: an update with nothing to send
/// is a no-op, so plan and reconcile agree.
fn select<H>(
    table: &TransitionTable,
    desired: DesiredLifecycle,
    observed: &ObservedState<H>,
) -> Transition {
    let drift = &observed.drift;
    match table.lookup(desired, observed.lifecycle) {
        Transition::Update if drift.changed.is_empty() => Transition::NoOp,
        Transition::UpdatePartial if drift.additions.is_empty() => Transition::NoOp,
        t => t,
    }
}

fn ensure_not_cancelled(ctx: &RunContext, transition: Transition) -> Result<()> {
    if ctx.cancel().is_cancelled() {
        return Err(ReconcileError::Cancelled(format!("before {}", transition)));
    }
    Ok(())
}

fn require_handle<H>(observed: &ObservedState<H>) -> Result<&H> {
    observed.handle.as_ref().ok_or_else(|| {
        ReconcileError::RemoteOperationFailure(format!(
            "probe reported {} without a resource handle",
            observed.lifecycle
        ))
    })
}
