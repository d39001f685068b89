//! Order creation stage

use async_trait::async_trait;
use tracing::{debug, warn};

use bombard_core::StatusKind;

use crate::context::TestContext;
use crate::stage::{Continuation, StageDeps, StageError, TestStage};

/// Creates the order and asserts the target starts it in collecting state
pub struct OrderCreationStage;

#[async_trait]
impl TestStage for OrderCreationStage {
    fn name(&self) -> &'static str {
        "OrderCreation"
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        let user = ctx.require_user()?;
        let order = deps.api.create_order(user).await?;

        if order.id.is_nil() {
            warn!(test = %ctx.test_id(), "Target returned an order without an id");
            return Ok(Continuation::Fail);
        }
        if order.status.kind() != StatusKind::Collecting {
            warn!(
                test = %ctx.test_id(),
                status = %order.status,
                "Order created in unexpected status"
            );
            return Ok(Continuation::Fail);
        }

        ctx.assign_order(order.id)?;
        debug!(test = %ctx.test_id(), order = %order.id, "Order created");
        deps.orders.observe(ctx.service_name(), order).await?;

        if ctx.knobs.stop_after_order_creation {
            return Ok(Continuation::Stop);
        }
        Ok(Continuation::Continue)
    }
}
