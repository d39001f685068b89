//! Abandoned-cart stage
//!
//! Lets the order sit idle past the target's abandonment threshold, then
//! audits the bucket sweep: an interacted cart must stay in collecting
//! state, an untouched one must be discarded.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

use bombard_core::StatusKind;
use bombard_resilience::{AwaitOutcome, ConditionAwaiter};

use crate::context::TestContext;
use crate::stage::{Continuation, StageDeps, StageError, TestStage};
use crate::stages::read_order;

/// Probabilistic abandoned-cart audit
pub struct OrderAbandonedStage {
    /// Share of tests that exercise this branch
    pub probability: f64,
    /// Idle time before the target's sweeper should act
    pub idle_threshold: Duration,
    /// How long to wait for a fresh bucket record
    pub bucket_deadline: Duration,
    /// How long to wait for an untouched cart to be discarded
    pub discard_deadline: Duration,
}

impl Default for OrderAbandonedStage {
    fn default() -> Self {
        Self {
            probability: 0.5,
            idle_threshold: Duration::from_secs(120),
            bucket_deadline: Duration::from_secs(30),
            discard_deadline: Duration::from_secs(15),
        }
    }
}

#[async_trait]
impl TestStage for OrderAbandonedStage {
    fn name(&self) -> &'static str {
        "OrderAbandoned"
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        if !rand::thread_rng().gen_bool(self.probability) {
            return Ok(Continuation::Continue);
        }

        let order_id = ctx.require_order()?;

        let history = deps.api.abandoned_cart_history(order_id).await?;
        let newest_before = history.iter().map(|r| r.timestamp).max().unwrap_or(i64::MIN);

        debug!(
            test = %ctx.test_id(),
            idle_secs = self.idle_threshold.as_secs(),
            "Letting the cart go idle"
        );
        let mut watch = deps.cancellation.clone();
        tokio::select! {
            _ = watch.cancelled() => return Ok(Continuation::Stop),
            _ = tokio::time::sleep(self.idle_threshold) => {}
        }

        let api = deps.api.clone();
        let outcome = ConditionAwaiter::at_most(self.bucket_deadline)
            .poll_every(deps.poll_interval)
            .cancelled_by(deps.cancellation.clone())
            .start_waiting(
                move || {
                    let api = api.clone();
                    async move {
                        let history = api.abandoned_cart_history(order_id).await?;
                        Ok::<bool, StageError>(
                            history.iter().any(|r| r.timestamp > newest_before),
                        )
                    }
                },
                || {
                    Err(StageError::Failed(
                        "no bucket sweep recorded for idle order".to_string(),
                    ))
                },
            )
            .await?;
        if outcome == AwaitOutcome::Cancelled {
            return Ok(Continuation::Stop);
        }

        let history = deps.api.abandoned_cart_history(order_id).await?;
        let newest = history
            .into_iter()
            .filter(|r| r.timestamp > newest_before)
            .max_by_key(|r| r.timestamp)
            .ok_or_else(|| {
                StageError::Unexpected("bucket record vanished between polls".to_string())
            })?;

        if newest.user_interacted {
            let order = read_order(ctx, deps).await?;
            if order.status.kind() != StatusKind::Collecting {
                warn!(
                    test = %ctx.test_id(),
                    status = %order.status,
                    "Interacted cart left collecting state"
                );
                return Ok(Continuation::Fail);
            }
        } else {
            let user = ctx.require_user()?;
            let api = deps.api.clone();
            let orders = deps.orders.clone();
            let service = ctx.service_name().to_string();

            let outcome = ConditionAwaiter::at_most(self.discard_deadline)
                .poll_every(deps.poll_interval)
                .cancelled_by(deps.cancellation.clone())
                .start_waiting(
                    move || {
                        let api = api.clone();
                        let orders = orders.clone();
                        let service = service.clone();
                        async move {
                            let order = api.get_order(user, order_id).await?;
                            let order = orders.observe(&service, order).await?;
                            Ok::<bool, StageError>(order.status.kind() == StatusKind::Discarded)
                        }
                    },
                    || {
                        Err(StageError::Failed(
                            "abandoned order was not discarded".to_string(),
                        ))
                    },
                )
                .await?;
            if outcome == AwaitOutcome::Cancelled {
                return Ok(Continuation::Stop);
            }
            // The discard is the expected end of an untouched cart's life;
            // there is nothing left to finalize or pay for.
            return Ok(Continuation::Stop);
        }

        Ok(Continuation::Continue)
    }
}
