//! Error types for reconciliation runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{DesiredLifecycle, ObservedLifecycle};

/// Errors reported by probe, action and readiness implementations.
///
/// This is the vocabulary a remote-system integration uses to tell the
/// engine what went wrong; the reconciler maps it onto [`ReconcileError`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The addressed resource does not exist (anymore).
    #[error("not found: {0}")]
    NotFound(String),

    /// A resource with the same identity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A parent/container of the resource does not exist.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// Any other failure reported by the remote system or its client.
    #[error("{0}")]
    Failed(String),
}

/// Fatal errors terminating a reconciliation run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// A required parent/container resource could not be found.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// Create was attempted against an already existing resource.
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    /// The (desired, observed) pair has no handler.
    #[error("unsupported transition: desired {desired}, observed {observed}")]
    UnsupportedTransition {
        desired: DesiredLifecycle,
        observed: ObservedLifecycle,
    },

    /// The remote system failed during observe or act.
    #[error("remote operation failed: {0}")]
    RemoteOperationFailure(String),

    /// A bounded wait ran out of attempts.
    #[error("timed out waiting for {what} after {attempts} attempts")]
    PollTimeout { what: String, attempts: u32 },

    /// The run was cancelled by the caller.
    #[error("cancelled while {0}")]
    Cancelled(String),
}

/// Stable, machine-readable error kind used in the JSON result contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingDependency,
    DuplicateResource,
    UnsupportedTransition,
    RemoteOperationFailure,
    PollTimeout,
    Cancelled,
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::MissingDependency(_) => ErrorKind::MissingDependency,
            ReconcileError::DuplicateResource(_) => ErrorKind::DuplicateResource,
            ReconcileError::UnsupportedTransition { .. } => ErrorKind::UnsupportedTransition,
            ReconcileError::RemoteOperationFailure(_) => ErrorKind::RemoteOperationFailure,
            ReconcileError::PollTimeout { .. } => ErrorKind::PollTimeout,
            ReconcileError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

impl From<RemoteError> for ReconcileError {
    /// Generic mapping used for observe and update. Create and delete apply
    /// their own rules for `AlreadyExists` and `NotFound` first.
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::MissingDependency(msg) => ReconcileError::MissingDependency(msg),
            RemoteError::AlreadyExists(msg) => ReconcileError::DuplicateResource(msg),
            other => ReconcileError::RemoteOperationFailure(other.to_string()),
        }
    }
}

/// Invalid configuration passed into a run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_wait_attempts must be at least 1")]
    ZeroAttempts,

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
