//! Per-run context passed explicitly to every component.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::Readiness;
use crate::config::ReconcileConfig;
use crate::error::RemoteError;
use crate::waiter::{CancelSignal, PollResult, Waiter};

/// Context for a single reconciliation run.
///
/// Constructed once per `reconcile`/`plan` call and handed by reference to
/// the probe, the actions and any readiness checks. Nothing in it outlives
/// the run.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    config: ReconcileConfig,
    cancel: CancelSignal,
    started: Instant,
}

impl RunContext {
    pub fn new(config: ReconcileConfig, cancel: CancelSignal) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            cancel,
            started: Instant::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn waiter(&self) -> Waiter {
        Waiter::new(self.config.wait, self.cancel.clone())
    }

    /// Run a remote call under the configured operation timeout, if any.
    pub async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let Some(limit) = self.config.operation_timeout else {
            return fut.await;
        };
        match tokio::time::timeout(limit, fut).await {
            Ok(r) => r,
            Err(_) => Err(RemoteError::Failed(format!(
                "{} timed out after {:?}",
                what, limit
            ))),
        }
    }

    /// Poll a readiness condition with the run's wait settings.
    pub async fn wait_for(&self, readiness: &dyn Readiness) -> Result<PollResult, RemoteError> {
        let what = readiness.describe();
        info!(
            run = %self.run_id,
            what = %what,
            max_attempts = self.config.wait.max_attempts,
            delay_secs = self.config.wait.delay.as_secs(),
            "Waiting"
        );

        let result = self
            .waiter()
            .try_wait_until(|| self.bounded(&what, readiness.check(self)))
            .await?;

        if result.succeeded {
            info!(run = %self.run_id, what = %what, attempts = result.attempts_used, "Ready");
        } else {
            warn!(run = %self.run_id, what = %what, attempts = result.attempts_used, "Not ready");
        }
        Ok(result)
    }
}
