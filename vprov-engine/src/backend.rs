//! Seams to the remote system.
//!
//! A remote-system integration provides a [`Probe`] to read current state
//! and an [`Action`] to mutate it. Both receive the per-run
//! [`RunContext`] and share a `Handle` type: the probe hands out a handle
//! for an existing resource and the action consumes it in the same run.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RunContext;
use crate::diff::merge_additions;
use crate::error::RemoteError;
use crate::state::{Attributes, Observation, TargetIdentity};

/// Reads the current state of a remote resource.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Reference to an existing resource, usable by the matching action.
    type Handle: Send + Sync;

    /// Fetch current state without mutating anything.
    ///
    /// Must return [`RemoteError::MissingDependency`] when an enclosing
    /// container named in `target.scope` does not exist.
    async fn observe(
        &self,
        ctx: &RunContext,
        target: &TargetIdentity,
        desired: &Attributes,
    ) -> Result<Observation<Self::Handle>, RemoteError>;
}

/// Mutates a remote resource.
#[async_trait]
pub trait Action: Send + Sync {
    type Handle: Send + Sync;

    /// Create the resource. A duplicate-name rejection from the remote
    /// system must be reported as [`RemoteError::AlreadyExists`].
    async fn create(
        &self,
        ctx: &RunContext,
        target: &TargetIdentity,
        attributes: &Attributes,
    ) -> Result<ActionResult, RemoteError>;

    /// Apply `changes`, which only holds attributes that differ remotely.
    async fn update(
        &self,
        ctx: &RunContext,
        handle: &Self::Handle,
        changes: &Attributes,
    ) -> Result<ActionResult, RemoteError>;

    /// Add list members without revoking any the resource already has.
    ///
    /// `additions` holds only the missing members; `observed` is the
    /// resource as read in this run. The default sends the merged lists
    /// through [`Action::update`]; systems with a native grant call should
    /// override it.
    async fn update_partial(
        &self,
        ctx: &RunContext,
        handle: &Self::Handle,
        additions: &Attributes,
        observed: &Attributes,
    ) -> Result<ActionResult, RemoteError> {
        let merged = merge_additions(observed, additions);
        self.update(ctx, handle, &merged).await
    }

    /// Delete the resource. A resource that vanished in the meantime should
    /// be reported as [`RemoteError::NotFound`].
    async fn delete(&self, ctx: &RunContext, handle: &Self::Handle)
        -> Result<ActionResult, RemoteError>;
}

/// A condition on the remote system that becomes true asynchronously,
/// e.g. a VM reaching powered-on state or an appliance API answering.
#[async_trait]
pub trait Readiness: Send + Sync {
    /// Short human-readable description, used in logs and timeout errors.
    fn describe(&self) -> String;

    /// Evaluate the condition once. An error aborts the wait.
    async fn check(&self, ctx: &RunContext) -> Result<bool, RemoteError>;
}

/// Result of a create, update or delete call.
pub struct ActionResult {
    pub changed: bool,
    pub result: Value,
    /// Asynchronous remote processes started by the action, awaited in order.
    pub pending: Vec<Box<dyn Readiness>>,
}

impl ActionResult {
    pub fn changed(result: Value) -> Self {
        Self {
            changed: true,
            result,
            pending: Vec::new(),
        }
    }

    pub fn unchanged(result: Value) -> Self {
        Self {
            changed: false,
            result,
            pending: Vec::new(),
        }
    }

    /// Attach an asynchronous process to wait for after the action returns.
    pub fn then_wait_for(mut self, readiness: impl Readiness + 'static) -> Self {
        self.pending.push(Box::new(readiness));
        self
    }
}

impl fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending: Vec<String> = self.pending.iter().map(|p| p.describe()).collect();
        f.debug_struct("ActionResult")
            .field("changed", &self.changed)
            .field("result", &self.result)
            .field("pending", &pending)
            .finish()
    }
}
