//! Readiness condition that turns true after a number of checks.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::Readiness;
use crate::context::RunContext;
use crate::error::RemoteError;

/// Simulated asynchronous remote process.
///
/// Becomes ready on the `ready_after`-th check. `None` never becomes ready.
/// With `fail_after` set, that check returns an error instead.
#[derive(Debug, Clone)]
pub struct CountdownTask {
    name: String,
    ready_after: Option<u32>,
    fail_after: Option<u32>,
    checks: Arc<AtomicU32>,
}

impl CountdownTask {
    pub fn ready_after(name: impl Into<String>, checks: u32) -> Self {
        Self {
            name: name.into(),
            ready_after: Some(checks),
            fail_after: None,
            checks: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn never(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready_after: None,
            fail_after: None,
            checks: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing_after(name: impl Into<String>, checks: u32) -> Self {
        Self {
            name: name.into(),
            ready_after: None,
            fail_after: Some(checks),
            checks: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of checks performed so far (shared between clones).
    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Readiness for CountdownTask {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn check(&self, _ctx: &RunContext) -> Result<bool, RemoteError> {
        let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_after.is_some_and(|f| n >= f) {
            return Err(RemoteError::Failed(format!("{} failed", self.name)));
        }
        Ok(self.ready_after.is_some_and(|r| n >= r))
    }
}
