//! Post-finalization change stage

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

use bombard_core::StatusKind;
use bombard_resilience::{AwaitOutcome, ConditionAwaiter};

use crate::context::TestContext;
use crate::stage::{Continuation, StageDeps, StageError, TestStage};
use crate::stages::CHANGE_AFTER_FINALIZATION_STAGE;

/// Probabilistically re-opens a booked order by changing its items,
/// flagging the context so the pipeline finalizes again
pub struct OrderChangeItemsAfterFinalizationStage {
    pub probability: f64,
    pub visibility_deadline: Duration,
}

impl Default for OrderChangeItemsAfterFinalizationStage {
    fn default() -> Self {
        Self {
            probability: 0.5,
            visibility_deadline: Duration::from_secs(3),
        }
    }
}

#[async_trait]
impl TestStage for OrderChangeItemsAfterFinalizationStage {
    fn name(&self) -> &'static str {
        CHANGE_AFTER_FINALIZATION_STAGE
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        if !rand::thread_rng().gen_bool(self.probability) {
            return Ok(Continuation::Continue);
        }

        let user = ctx.require_user()?;
        let order_id = ctx.require_order()?;

        let items = deps.api.get_available_items(user).await?;
        if items.is_empty() {
            debug!(test = %ctx.test_id(), "No items available to change the order with");
            return Ok(Continuation::Continue);
        }

        let (item_id, amount) = {
            let mut rng = rand::thread_rng();
            (items[rng.gen_range(0..items.len())].id, rng.gen_range(1..=3))
        };

        let accepted = deps
            .api
            .put_item_to_order(user, order_id, item_id, amount)
            .await?;
        if !accepted {
            warn!(
                test = %ctx.test_id(),
                item = %item_id,
                "Target rejected the post-finalization change"
            );
            return Ok(Continuation::Fail);
        }

        let api = deps.api.clone();
        let orders = deps.orders.clone();
        let service = ctx.service_name().to_string();

        let outcome = ConditionAwaiter::at_most(self.visibility_deadline)
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
                        let visible =
                            order.items.get(&item_id).map(|line| line.amount) == Some(amount);
                        Ok::<bool, StageError>(
                            visible && order.status.kind() == StatusKind::Collecting,
                        )
                    }
                },
                || {
                    Err(StageError::Failed(
                        "order did not re-enter collecting after the change".to_string(),
                    ))
                },
            )
            .await?;
        if outcome == AwaitOutcome::Cancelled {
            return Ok(Continuation::Stop);
        }

        ctx.was_changed_after_finalization = true;
        Ok(Continuation::Continue)
    }
}
