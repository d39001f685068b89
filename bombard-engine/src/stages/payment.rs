//! Payment stage

use async_trait::async_trait;
use tracing::{debug, warn};

use bombard_core::{PaymentStatus, StatusKind};

use crate::context::TestContext;
use crate::stage::{Continuation, StageDeps, StageError, TestStage};

/// Pays for the order, mirroring the charge into the local credit ledger.
///
/// A payment the target rejects for insufficient funds fails the test; a
/// generic payment failure requests a retry so the surrounding decorator
/// can re-run the stage.
pub struct OrderPaymentStage;

#[async_trait]
impl TestStage for OrderPaymentStage {
    fn name(&self) -> &'static str {
        "OrderPayment"
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        let user = ctx.require_user()?;
        let order_id = ctx.require_order()?;

        let order = deps.api.pay_order(user, order_id).await?;
        let order = deps.orders.observe(ctx.service_name(), order).await?;
        ctx.payment.attempts += 1;

        let Some(record) = order.payment_history.last() else {
            warn!(test = %ctx.test_id(), "Payment history empty after payment attempt");
            return Ok(Continuation::Fail);
        };

        match record.status {
            PaymentStatus::Success => {
                if order.status.kind() != StatusKind::Payed {
                    warn!(
                        test = %ctx.test_id(),
                        status = %order.status,
                        "Successful payment left the order unpaid"
                    );
                    return Ok(Continuation::Fail);
                }

                let total = order.total_cost();
                if record.amount != total {
                    warn!(
                        test = %ctx.test_id(),
                        charged = record.amount,
                        expected = total,
                        "Payment amount does not match the cart total"
                    );
                    return Ok(Continuation::Fail);
                }

                deps.users.spend(user, total).await?;
                ctx.payment.amount_paid = Some(total);
                debug!(test = %ctx.test_id(), amount = total, "Order payed");
                Ok(Continuation::Continue)
            }
            PaymentStatus::FailedNotEnoughMoney => {
                warn!(test = %ctx.test_id(), "Payment rejected for insufficient funds");
                Ok(Continuation::Fail)
            }
            PaymentStatus::Failed => {
                debug!(
                    test = %ctx.test_id(),
                    attempt = ctx.payment.attempts,
                    "Generic payment failure, requesting retry"
                );
                Ok(Continuation::Retry)
            }
        }
    }
}
