//! Item collection stage

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tracing::warn;

use bombard_core::StatusKind;
use bombard_resilience::{AwaitOutcome, ConditionAwaiter};

use crate::context::TestContext;
use crate::stage::{Continuation, StageDeps, StageError, TestStage};

/// Puts a random selection of items into the order, waiting after each
/// placement until the target's snapshot reflects the exact amount
pub struct OrderCollectingStage {
    pub max_distinct_items: usize,
    pub max_amount_per_item: i64,
    pub visibility_deadline: Duration,
}

impl Default for OrderCollectingStage {
    fn default() -> Self {
        Self {
            max_distinct_items: 3,
            max_amount_per_item: 5,
            visibility_deadline: Duration::from_secs(3),
        }
    }
}

#[async_trait]
impl TestStage for OrderCollectingStage {
    fn name(&self) -> &'static str {
        "OrderCollecting"
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        let user = ctx.require_user()?;
        let order_id = ctx.require_order()?;

        let mut items = deps.api.get_available_items(user).await?;
        if items.is_empty() {
            warn!(test = %ctx.test_id(), "No items available to collect");
            return Ok(Continuation::Fail);
        }

        {
            let mut rng = rand::thread_rng();
            items.shuffle(&mut rng);
            let count = rng.gen_range(1..=items.len().min(self.max_distinct_items));
            items.truncate(count);
        }

        for item in items {
            let amount = rand::thread_rng().gen_range(1..=self.max_amount_per_item);
            let accepted = deps
                .api
                .put_item_to_order(user, order_id, item.id, amount)
                .await?;
            if !accepted {
                warn!(test = %ctx.test_id(), item = %item.id, "Target rejected item placement");
                return Ok(Continuation::Fail);
            }

            let api = deps.api.clone();
            let orders = deps.orders.clone();
            let service = ctx.service_name().to_string();
            let item_id = item.id;

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
                        Err(StageError::Failed(format!(
                            "item {item_id} (amount {amount}) not visible in collecting order"
                        )))
                    },
                )
                .await?;

            if outcome == AwaitOutcome::Cancelled {
                return Ok(Continuation::Stop);
            }
        }

        Ok(Continuation::Continue)
    }
}
