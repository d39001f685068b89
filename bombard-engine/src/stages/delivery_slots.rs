//! Delivery slot selection stage

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::context::TestContext;
use crate::stage::{Continuation, StageDeps, StageError, TestStage};
use crate::stages::read_order;

/// Picks a random available slot and asserts the choice sticks
pub struct OrderSettingDeliverySlotsStage;

#[async_trait]
impl TestStage for OrderSettingDeliverySlotsStage {
    fn name(&self) -> &'static str {
        "OrderSettingDeliverySlots"
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        let order_id = ctx.require_order()?;

        let slots = deps.api.get_delivery_slots(order_id).await?;
        if slots.is_empty() {
            warn!(test = %ctx.test_id(), "Target offered no delivery slots");
            return Ok(Continuation::Fail);
        }

        let slot = slots[rand::thread_rng().gen_range(0..slots.len())];
        deps.api.set_delivery_time(order_id, slot).await?;

        let order = read_order(ctx, deps).await?;
        if order.delivery_duration != Some(slot) {
            warn!(
                test = %ctx.test_id(),
                chosen = slot,
                observed = ?order.delivery_duration,
                "Chosen delivery slot not observable on re-read"
            );
            return Ok(Continuation::Fail);
        }

        Ok(Continuation::Continue)
    }
}
