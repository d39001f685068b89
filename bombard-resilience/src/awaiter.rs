//! Polling condition awaiter
//!
//! Stages use this to synchronize with asynchronous state changes on the
//! target service: re-evaluate a predicate at a fixed interval until it
//! holds, the deadline expires, or the surrounding flow is cancelled.

use log::debug;
use std::future::Future;
use std::time::Duration;

use crate::cancellation::CancellationWatch;

/// Default interval between predicate evaluations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How an awaited condition concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitOutcome {
    /// The predicate became true before the deadline
    Satisfied,
    /// The deadline expired; the on-timeout handler ran exactly once
    TimedOut,
    /// The flow was cancelled; the on-timeout handler did not run
    Cancelled,
}

/// Builder for one condition wait
#[derive(Debug)]
pub struct ConditionAwaiter {
    deadline: Duration,
    poll_interval: Duration,
    cancellation: Option<CancellationWatch>,
}

impl ConditionAwaiter {
    /// Start building a wait bounded by `deadline`
    pub fn at_most(deadline: Duration) -> Self {
        Self {
            deadline,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancellation: None,
        }
    }

    /// Override the polling interval
    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Make the wait return promptly when the given flow is cancelled
    pub fn cancelled_by(mut self, watch: CancellationWatch) -> Self {
        self.cancellation = Some(watch);
        self
    }

    /// Poll `condition` until it yields true or the deadline passes.
    ///
    /// The predicate must be safe to re-evaluate; it may suspend (it
    /// typically calls the target service) and it may fail, in which case
    /// the error propagates unchanged. On deadline expiry `on_timeout` runs
    /// exactly once and may itself fail to raise a stage-failure signal.
    pub async fn start_waiting<P, Fut, F, E>(
        self,
        mut condition: P,
        on_timeout: F,
    ) -> Result<AwaitOutcome, E>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        F: FnOnce() -> Result<(), E>,
    {
        let mut cancellation = self.cancellation;
        let started = tokio::time::Instant::now();

        loop {
            if let Some(watch) = &cancellation {
                if watch.is_cancelled() {
                    return Ok(AwaitOutcome::Cancelled);
                }
            }

            let satisfied = match &mut cancellation {
                Some(watch) => {
                    tokio::select! {
                        _ = watch.cancelled() => return Ok(AwaitOutcome::Cancelled),
                        result = condition() => result?,
                    }
                }
                None => condition().await?,
            };

            if satisfied {
                return Ok(AwaitOutcome::Satisfied);
            }

            if started.elapsed() >= self.deadline {
                debug!(
                    "Condition not satisfied within {:?}, invoking timeout handler",
                    self.deadline
                );
                on_timeout()?;
                return Ok(AwaitOutcome::TimedOut);
            }

            match &mut cancellation {
                Some(watch) => {
                    tokio::select! {
                        _ = watch.cancelled() => return Ok(AwaitOutcome::Cancelled),
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::FlowCancellation;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_satisfied_immediately() {
        let outcome: Result<AwaitOutcome, Infallible> = ConditionAwaiter::at_most(
            Duration::from_secs(1),
        )
        .start_waiting(|| async { Ok(true) }, || Ok(()))
        .await;

        assert_eq!(outcome.unwrap(), AwaitOutcome::Satisfied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_satisfied_within_one_interval_of_becoming_true() {
        let polls = Arc::new(AtomicU32::new(0));
        let polls_clone = polls.clone();

        let started = tokio::time::Instant::now();
        let outcome: Result<AwaitOutcome, Infallible> = ConditionAwaiter::at_most(
            Duration::from_secs(5),
        )
        .start_waiting(
            move || {
                let count = polls_clone.fetch_add(1, Ordering::Relaxed);
                async move { Ok(count >= 3) }
            },
            || Ok(()),
        )
        .await;

        assert_eq!(outcome.unwrap(), AwaitOutcome::Satisfied);
        assert_eq!(polls.load(Ordering::Relaxed), 4);
        // Three sleeps of the default interval before the satisfying poll
        assert_eq!(started.elapsed(), DEFAULT_POLL_INTERVAL * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_handler_exactly_once() {
        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = fired.clone();

        let started = tokio::time::Instant::now();
        let outcome: Result<AwaitOutcome, Infallible> = ConditionAwaiter::at_most(
            Duration::from_secs(1),
        )
        .start_waiting(
            || async { Ok(false) },
            move || {
                fired_clone.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        )
        .await;

        assert_eq!(outcome.unwrap(), AwaitOutcome::TimedOut);
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed <= Duration::from_secs(1) + DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_handler_error_propagates() {
        let result: Result<AwaitOutcome, &str> =
            ConditionAwaiter::at_most(Duration::from_millis(300))
                .start_waiting(|| async { Ok(false) }, || Err("order never became booked"))
                .await;

        assert_eq!(result.unwrap_err(), "order never became booked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_error_propagates() {
        let result: Result<AwaitOutcome, &str> = ConditionAwaiter::at_most(Duration::from_secs(1))
            .start_waiting(|| async { Err("remote unreachable") }, || Ok(()))
            .await;

        assert_eq!(result.unwrap_err(), "remote unreachable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_skips_timeout_handler() {
        let cancellation = FlowCancellation::new();
        let watch = cancellation.watch();
        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = fired.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            cancellation.cancel();
        });

        let started = tokio::time::Instant::now();
        let outcome: Result<AwaitOutcome, Infallible> = ConditionAwaiter::at_most(
            Duration::from_secs(30),
        )
        .cancelled_by(watch)
        .start_waiting(
            || async { Ok(false) },
            move || {
                fired_clone.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        )
        .await;

        assert_eq!(outcome.unwrap(), AwaitOutcome::Cancelled);
        assert_eq!(fired.load(Ordering::Relaxed), 0);
        // Returned at the suspension point, not after the 30 s deadline
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
