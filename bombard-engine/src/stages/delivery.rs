//! Delivery stage
//!
//! Drives the order from payed to a terminal state and audits the
//! conclusion: a delivered order must finish inside the promised slot with
//! a successful delivery log, a refunded one must balance its withdrawals
//! against its refunds.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use bombard_core::{
    DeliveryOutcome, FinancialLogRecord, FinancialOperationType, OrderStatus, StatusKind,
};
use bombard_resilience::{AwaitOutcome, ConditionAwaiter};

use crate::context::TestContext;
use crate::stage::{Continuation, StageDeps, StageError, TestStage};
use crate::stages::read_order;

/// Delivery simulation and terminal-state audit
pub struct OrderDeliveryStage {
    /// Slack added on top of the chosen slot when awaiting the terminal state
    pub grace: Duration,
}

impl Default for OrderDeliveryStage {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
        }
    }
}

fn withdrawn_total(history: &[FinancialLogRecord]) -> i64 {
    history
        .iter()
        .filter(|r| r.record_type == FinancialOperationType::Withdraw)
        .map(|r| r.amount)
        .sum()
}

fn refunded_total(history: &[FinancialLogRecord]) -> i64 {
    history
        .iter()
        .filter(|r| r.record_type == FinancialOperationType::Refund)
        .map(|r| r.amount)
        .sum()
}

#[async_trait]
impl TestStage for OrderDeliveryStage {
    fn name(&self) -> &'static str {
        "OrderDelivery"
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        let user = ctx.require_user()?;
        let order_id = ctx.require_order()?;

        let order = read_order(ctx, deps).await?;
        let payment_time = match &order.status {
            OrderStatus::Payed { payment_time } => *payment_time,
            other => {
                warn!(test = %ctx.test_id(), status = %other, "Order not payed before delivery");
                return Ok(Continuation::Fail);
            }
        };
        let Some(slot_seconds) = order.delivery_duration else {
            warn!(test = %ctx.test_id(), "Payed order has no delivery slot");
            return Ok(Continuation::Fail);
        };

        deps.api.simulate_delivery(order_id).await?;
        debug!(test = %ctx.test_id(), slot_seconds, "Delivery started");

        let deadline = Duration::from_secs(slot_seconds.max(0) as u64) + self.grace;
        let api = deps.api.clone();
        let orders = deps.orders.clone();
        let service = ctx.service_name().to_string();

        let outcome = ConditionAwaiter::at_most(deadline)
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
                        match order.status.kind() {
                            StatusKind::Delivered => Ok::<bool, StageError>(true),
                            StatusKind::Refund => {
                                let history = api.get_financial_history(user, order_id).await?;
                                Ok(withdrawn_total(&history) == refunded_total(&history))
                            }
                            _ => Ok(false),
                        }
                    }
                },
                || {
                    Err(StageError::Failed(
                        "order neither delivered nor refunded within the slot".to_string(),
                    ))
                },
            )
            .await?;
        if outcome == AwaitOutcome::Cancelled {
            return Ok(Continuation::Stop);
        }

        let order = read_order(ctx, deps).await?;
        match &order.status {
            OrderStatus::Delivered {
                delivery_finish_time,
                ..
            } => {
                let log = deps.api.delivery_log(order_id).await?;
                if log.outcome != DeliveryOutcome::Success {
                    warn!(test = %ctx.test_id(), "Delivered order has a failed delivery log");
                    return Ok(Continuation::Fail);
                }

                let last_payment = order
                    .last_successful_payment()
                    .map(|r| r.timestamp)
                    .unwrap_or(payment_time);
                if *delivery_finish_time > last_payment + slot_seconds * 1000 {
                    warn!(
                        test = %ctx.test_id(),
                        finish = delivery_finish_time,
                        promised_by = last_payment + slot_seconds * 1000,
                        "Delivery finished after the promised slot"
                    );
                    return Ok(Continuation::Fail);
                }
                Ok(Continuation::Continue)
            }
            OrderStatus::Refund => {
                let history = deps.api.get_financial_history(user, order_id).await?;
                let withdrawn = withdrawn_total(&history);
                let refunded = refunded_total(&history);
                if withdrawn != refunded {
                    warn!(
                        test = %ctx.test_id(),
                        withdrawn,
                        refunded,
                        "Refund does not balance the withdrawals"
                    );
                    return Ok(Continuation::Fail);
                }
                deps.users.refund(user, refunded).await?;
                Ok(Continuation::Continue)
            }
            other => {
                warn!(
                    test = %ctx.test_id(),
                    status = %other,
                    "Illegal order transition at delivery conclusion"
                );
                Ok(Continuation::Fail)
            }
        }
    }
}
