//! vprov-engine: declarative state reconciliation for remote resources.
//!
//! A caller describes what a remote resource should look like
//! ([`DesiredStateSpec`]). The [`Reconciler`] reads the current state
//! through a [`Probe`], picks one transition from a total
//! [`TransitionTable`], applies it through an [`Action`] and waits for any
//! asynchronous remote process with a bounded [`Waiter`]. The run ends with
//! a single [`Outcome`]: `{changed, result, error}`.
//!
//! Remote-system specifics (vSphere, OpenStack, appliance REST APIs) live
//! behind the probe and action traits.

pub mod backend;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod outcome;
pub mod reconciler;
pub mod state;
pub mod test_util;
pub mod transition;
pub mod waiter;

pub use backend::{Action, ActionResult, Probe, Readiness};
pub use config::{ReconcileConfig, WaitConfig};
pub use context::RunContext;
pub use diff::{diff_attributes, merge_additions, DiffPolicy, Drift};
pub use error::{ConfigError, ErrorKind, ReconcileError, RemoteError};
pub use outcome::Outcome;
pub use reconciler::{Plan, Reconciler};
pub use state::{
    Attributes, DesiredLifecycle, DesiredStateSpec, Observation, ObservedLifecycle,
    ObservedState, ScopeSegment, TargetIdentity,
};
pub use transition::{Transition, TransitionTable};
pub use waiter::{CancelHandle, CancelSignal, PollResult, Waiter};
