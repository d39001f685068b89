//! Order finalization stage

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use bombard_core::{BookingStatus, StatusKind};
use bombard_resilience::{AwaitOutcome, ConditionAwaiter};

use crate::context::TestContext;
use crate::stage::{Continuation, StageDeps, StageError, TestStage};
use crate::stages::{read_order, FINALIZING_STAGE};

/// Finalizes the order and waits for the booking to settle.
///
/// A clean booking must drive the order to booked state; a booking with
/// failed items must leave the order collecting, with every failed item
/// accounted for in the booking log.
pub struct OrderFinalizingStage {
    pub booked_deadline: Duration,
}

impl Default for OrderFinalizingStage {
    fn default() -> Self {
        Self {
            booked_deadline: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl TestStage for OrderFinalizingStage {
    fn name(&self) -> &'static str {
        FINALIZING_STAGE
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        let user = ctx.require_user()?;
        let order_id = ctx.require_order()?;

        let booking = deps.api.finalize_order(order_id).await?;
        debug!(
            test = %ctx.test_id(),
            booking = %booking.booking_id,
            failed_items = booking.failed_items.len(),
            "Order finalized"
        );

        if booking.failed_items.is_empty() {
            let api = deps.api.clone();
            let orders = deps.orders.clone();
            let service = ctx.service_name().to_string();

            let outcome = ConditionAwaiter::at_most(self.booked_deadline)
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
                            Ok::<bool, StageError>(order.status.kind() == StatusKind::Booked)
                        }
                    },
                    || {
                        Err(StageError::Failed(
                            "order did not reach booked state after finalization".to_string(),
                        ))
                    },
                )
                .await?;
            if outcome == AwaitOutcome::Cancelled {
                return Ok(Continuation::Stop);
            }
        } else {
            let order = read_order(ctx, deps).await?;
            if order.status.kind() != StatusKind::Collecting {
                warn!(
                    test = %ctx.test_id(),
                    status = %order.status,
                    "Partially failed booking moved the order out of collecting"
                );
                return Ok(Continuation::Fail);
            }

            let log = deps.api.get_booking_history(booking.booking_id).await?;
            for item_id in &booking.failed_items {
                let recorded = log
                    .iter()
                    .any(|r| r.item_id == *item_id && r.status == BookingStatus::Failed);
                if !recorded {
                    warn!(
                        test = %ctx.test_id(),
                        item = %item_id,
                        "Failed item missing from the booking log"
                    );
                    return Ok(Continuation::Fail);
                }
            }
        }

        Ok(Continuation::Continue)
    }
}
