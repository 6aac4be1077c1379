//! Transition table mapping (desired, observed) lifecycle pairs to actions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::{DesiredLifecycle, ObservedLifecycle};

/// Action selected for a (desired, observed) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    NoOp,
    Create,
    Delete,
    /// Apply every drifted attribute.
    Update,
    /// Apply only the additive part of the drift (missing list members).
    UpdatePartial,
    /// No handler; the run fails.
    Unsupported,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::NoOp => "no_op",
            Transition::Create => "create",
            Transition::Delete => "delete",
            Transition::Update => "update",
            Transition::UpdatePartial => "update_partial",
            Transition::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Total 2×3 transition table.
///
/// Every cell is always populated, so a lookup can never miss. Resource
/// types that cannot handle a combination map it to
/// [`Transition::Unsupported`] instead of leaving it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTable {
    cells: [[Transition; 3]; 2],
}

impl TransitionTable {
    /// present: absent -> create, present -> no_op, needs_update -> update
    /// absent:  absent -> no_op,  present -> delete, needs_update -> delete
    pub const fn standard() -> Self {
        Self {
            cells: [
                [Transition::Create, Transition::NoOp, Transition::Update],
                [Transition::NoOp, Transition::Delete, Transition::Delete],
            ],
        }
    }

    /// For resources without an update handler, such as appliance
    /// deployments: drift on an existing resource fails loudly.
    pub const fn create_only() -> Self {
        Self::standard().with(
            DesiredLifecycle::Present,
            ObservedLifecycle::NeedsUpdate,
            Transition::Unsupported,
        )
    }

    /// Drift is converged by adding missing members only.
    pub const fn additive() -> Self {
        Self::standard().with(
            DesiredLifecycle::Present,
            ObservedLifecycle::NeedsUpdate,
            Transition::UpdatePartial,
        )
    }

    /// Override a single cell.
    pub const fn with(
        mut self,
        desired: DesiredLifecycle,
        observed: ObservedLifecycle,
        transition: Transition,
    ) -> Self {
        self.cells[desired_index(desired)][observed_index(observed)] = transition;
        self
    }

    pub const fn lookup(&self, desired: DesiredLifecycle, observed: ObservedLifecycle) -> Transition {
        self.cells[desired_index(desired)][observed_index(observed)]
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

const fn desired_index(d: DesiredLifecycle) -> usize {
    match d {
        DesiredLifecycle::Present => 0,
        DesiredLifecycle::Absent => 1,
    }
}

const fn observed_index(o: ObservedLifecycle) -> usize {
    match o {
        ObservedLifecycle::Absent => 0,
        ObservedLifecycle::Present => 1,
        ObservedLifecycle::NeedsUpdate => 2,
    }
}
