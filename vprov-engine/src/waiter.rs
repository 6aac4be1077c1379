//! Bounded polling for asynchronous remote effects.
//!
//! A [`Waiter`] evaluates a predicate up to `max_attempts` times with a
//! fixed delay in between. There is no backoff. Waits can be cut short
//! through a [`CancelSignal`].

use std::future::{pending, Future};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::WaitConfig;

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollResult {
    pub attempts_used: u32,
    pub succeeded: bool,
    pub cancelled: bool,
}

impl PollResult {
    fn ready(attempts_used: u32) -> Self {
        Self {
            attempts_used,
            succeeded: true,
            cancelled: false,
        }
    }

    fn exhausted(attempts_used: u32) -> Self {
        Self {
            attempts_used,
            succeeded: false,
            cancelled: false,
        }
    }

    fn cancelled(attempts_used: u32) -> Self {
        Self {
            attempts_used,
            succeeded: false,
            cancelled: true,
        }
    }
}

/// Receiving side of a cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

/// Sending side of a cancellation flag.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn channel() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return pending().await;
            }
        }
    }
}

/// Fixed-delay, fixed-cap polling loop.
#[derive(Debug, Clone)]
pub struct Waiter {
    config: WaitConfig,
    cancel: CancelSignal,
}

impl Waiter {
    pub fn new(config: WaitConfig, cancel: CancelSignal) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Poll `predicate` until it returns true or attempts run out.
    pub async fn wait_until<F, Fut>(&self, mut predicate: F) -> PollResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let result = self
            .try_wait_until(|| {
                let fut = predicate();
                async move { Ok::<bool, std::convert::Infallible>(fut.await) }
            })
            .await;
        match result {
            Ok(r) => r,
            Err(never) => match never {},
        }
    }

    /// Like [`Waiter::wait_until`], but an `Err` from the predicate ends
    /// the wait immediately and is returned to the caller.
    pub async fn try_wait_until<F, Fut, E>(&self, mut predicate: F) -> Result<PollResult, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        let max_attempts = self.config.max_attempts;
        let mut attempts = 0;

        while attempts < max_attempts {
            if self.cancel.is_cancelled() {
                info!(attempts, "Wait cancelled");
                return Ok(PollResult::cancelled(attempts));
            }

            attempts += 1;
            let ready = tokio::select! {
                r = predicate() => r?,
                _ = self.cancel.cancelled() => {
                    info!(attempts, "Wait cancelled");
                    return Ok(PollResult::cancelled(attempts));
                }
            };

            if ready {
                debug!(attempts, "Condition met");
                return Ok(PollResult::ready(attempts));
            }

            if attempts == max_attempts {
                break;
            }

            debug!(
                attempt = attempts,
                max_attempts,
                delay_secs = self.config.delay.as_secs(),
                "Condition not met yet, retrying..."
            );
            tokio::select! {
                _ = tokio::time::sleep(self.config.delay) => {}
                _ = self.cancel.cancelled() => {
                    info!(attempts, "Wait cancelled");
                    return Ok(PollResult::cancelled(attempts));
                }
            }
        }

        warn!(attempts, "Gave up waiting");
        Ok(PollResult::exhausted(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;
    use tokio::time::Instant;

    fn waiter(max_attempts: u32, delay_secs: u64) -> Waiter {
        Waiter::new(
            WaitConfig::new(max_attempts, Duration::from_secs(delay_secs)),
            CancelSignal::never(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn never_true_stops_after_max_attempts() {
        let calls = Cell::new(0u32);
        let start = Instant::now();
        let result = waiter(30, 15)
            .wait_until(|| {
                calls.set(calls.get() + 1);
                async { false }
            })
            .await;

        assert_eq!(calls.get(), 30);
        assert_eq!(result.attempts_used, 30);
        assert!(!result.succeeded);
        assert!(!result.cancelled);
        // 29 sleeps, none after the final attempt
        assert_eq!(start.elapsed(), Duration::from_secs(29 * 15));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_immediately_without_sleeping() {
        let start = Instant::now();
        let result = waiter(30, 15).wait_until(|| async { true }).await;
        assert!(result.succeeded);
        assert_eq!(result.attempts_used, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let calls = Cell::new(0u32);
        let result = waiter(5, 1)
            .wait_until(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { n >= 3 }
            })
            .await;
        assert!(result.succeeded);
        assert_eq!(result.attempts_used, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_error_ends_wait() {
        let result: Result<PollResult, String> = waiter(5, 1)
            .try_wait_until(|| async { Err("task failed".to_string()) })
            .await;
        assert_eq!(result, Err("task failed".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let (handle, signal) = CancelSignal::channel();
        let w = Waiter::new(WaitConfig::new(30, Duration::from_secs(15)), signal);

        let start = Instant::now();
        let (result, _) = tokio::join!(w.wait_until(|| async { false }), async {
            tokio::time::sleep(Duration::from_secs(20)).await;
            handle.cancel();
        });

        assert!(result.cancelled);
        assert!(!result.succeeded);
        assert_eq!(result.attempts_used, 2);
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_does_not_poll() {
        let (handle, signal) = CancelSignal::channel();
        handle.cancel();
        let calls = Cell::new(0u32);
        let result = Waiter::new(WaitConfig::default(), signal)
            .wait_until(|| {
                calls.set(calls.get() + 1);
                async { true }
            })
            .await;
        assert!(result.cancelled);
        assert_eq!(result.attempts_used, 0);
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_never_cancels() {
        let (handle, signal) = CancelSignal::channel();
        drop(handle);
        let w = Waiter::new(WaitConfig::new(3, Duration::from_secs(1)), signal);
        let result = w.wait_until(|| async { false }).await;
        assert!(!result.cancelled);
        assert_eq!(result.attempts_used, 3);
    }
}
