//! User selection stage

use async_trait::async_trait;
use tracing::debug;

use crate::context::TestContext;
use crate::stage::{Continuation, StageDeps, StageError, TestStage};

/// Selects a random pool user and binds it to the context. Non-retryable.
pub struct ChooseUserAccountStage;

#[async_trait]
impl TestStage for ChooseUserAccountStage {
    fn name(&self) -> &'static str {
        "ChooseUserAccount"
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        let user = deps.users.random_user(ctx.service_name()).await?;
        ctx.assign_user(user)?;
        debug!(test = %ctx.test_id(), %user, "User chosen");
        Ok(Continuation::Continue)
    }
}
