//! Concrete pipeline stages
//!
//! Stages appear here in pipeline order: user selection, order creation,
//! item collection, the probabilistic abandonment branch, finalization,
//! slot selection, the probabilistic post-finalization change, payment,
//! and delivery.

pub mod change_after_finalization;
pub mod choose_user;
pub mod delivery;
pub mod delivery_slots;
pub mod order_abandoned;
pub mod order_collecting;
pub mod order_creation;
pub mod order_finalizing;
pub mod payment;

pub use change_after_finalization::OrderChangeItemsAfterFinalizationStage;
pub use choose_user::ChooseUserAccountStage;
pub use delivery::OrderDeliveryStage;
pub use delivery_slots::OrderSettingDeliverySlotsStage;
pub use order_abandoned::OrderAbandonedStage;
pub use order_collecting::OrderCollectingStage;
pub use order_creation::OrderCreationStage;
pub use order_finalizing::OrderFinalizingStage;
pub use payment::OrderPaymentStage;

use bombard_core::Order;

use crate::context::TestContext;
use crate::stage::{StageDeps, StageError};

/// Stage names the context consults for re-finalization bookkeeping
pub(crate) const FINALIZING_STAGE: &str = "OrderFinalizing";
pub(crate) const CHANGE_AFTER_FINALIZATION_STAGE: &str = "OrderChangeItemsAfterFinalization";

/// Read the test's order from the target and record the snapshot,
/// auditing the observed status change
pub(crate) async fn read_order(
    ctx: &TestContext,
    deps: &StageDeps,
) -> Result<Order, StageError> {
    let user = ctx.require_user()?;
    let order_id = ctx.require_order()?;
    let order = deps.api.get_order(user, order_id).await?;
    Ok(deps.orders.observe(ctx.service_name(), order).await?)
}
