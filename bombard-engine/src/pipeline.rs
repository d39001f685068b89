//! Per-test stage pipeline assembly and execution
//!
//! A fresh decorated pipeline is assembled for every test. The sequence is
//! fixed; only the post-finalization segment is conditional, driven by the
//! context's re-finalization flag.

use tracing::error;

use bombard_config::HarnessConfig;

use crate::context::TestContext;
use crate::flow::{TestOutcome, TestParams};
use crate::stage::{
    innermost_name, instrumented, instrumented_retryable, Continuation, StageDeps, TestStage,
};
use crate::stages::{
    ChooseUserAccountStage, OrderAbandonedStage, OrderChangeItemsAfterFinalizationStage,
    OrderCollectingStage, OrderCreationStage, OrderDeliveryStage, OrderFinalizingStage,
    OrderPaymentStage, OrderSettingDeliverySlotsStage,
};

/// The ordered stage sequence for one test
pub struct Pipeline {
    head: Vec<Box<dyn TestStage>>,
    refinalize: Vec<Box<dyn TestStage>>,
    tail: Vec<Box<dyn TestStage>>,
}

/// Assemble the decorated stage sequence for one test
pub fn build_pipeline(config: &HarnessConfig, params: &TestParams) -> Pipeline {
    let head: Vec<Box<dyn TestStage>> = vec![
        instrumented(Box::new(ChooseUserAccountStage)),
        instrumented(Box::new(OrderCreationStage)),
        instrumented(Box::new(OrderCollectingStage::default())),
        instrumented(Box::new(OrderAbandonedStage {
            probability: config.abandoned_probability,
            idle_threshold: config.abandoned_idle_threshold,
            ..Default::default()
        })),
        instrumented(Box::new(OrderFinalizingStage::default())),
        instrumented(Box::new(OrderSettingDeliverySlotsStage)),
        instrumented(Box::new(OrderChangeItemsAfterFinalizationStage {
            probability: config.change_after_finalization_probability,
            ..Default::default()
        })),
    ];

    let refinalize: Vec<Box<dyn TestStage>> = vec![
        instrumented(Box::new(OrderFinalizingStage::default())),
        instrumented(Box::new(OrderSettingDeliverySlotsStage)),
    ];

    let mut tail: Vec<Box<dyn TestStage>> =
        vec![instrumented_retryable(Box::new(OrderPaymentStage))];
    if !params.test_success_by_payment_fact {
        tail.push(instrumented(Box::new(OrderDeliveryStage::default())));
    }

    Pipeline {
        head,
        refinalize,
        tail,
    }
}

/// Run the pipeline to completion, returning the test's outcome.
///
/// Stages run strictly sequentially; the first non-continue outcome ends
/// the test. Items changed after finalization trigger one more
/// finalize-and-slot pass before payment.
pub async fn run_pipeline(
    pipeline: &Pipeline,
    ctx: &mut TestContext,
    deps: &StageDeps,
) -> TestOutcome {
    if let Some(outcome) = run_segment(&pipeline.head, ctx, deps).await {
        return outcome;
    }
    if ctx.finalization_needed() {
        if let Some(outcome) = run_segment(&pipeline.refinalize, ctx, deps).await {
            return outcome;
        }
    }
    if let Some(outcome) = run_segment(&pipeline.tail, ctx, deps).await {
        return outcome;
    }
    TestOutcome::Success
}

async fn run_segment(
    stages: &[Box<dyn TestStage>],
    ctx: &mut TestContext,
    deps: &StageDeps,
) -> Option<TestOutcome> {
    for stage in stages {
        match stage.run(ctx, deps).await {
            Ok(Continuation::Continue) => {
                ctx.mark_stage_complete(innermost_name(stage.as_ref()));
            }
            Ok(other) => return Some(TestOutcome::from(other)),
            Err(err) => {
                error!(
                    stage = innermost_name(stage.as_ref()),
                    test = %ctx.test_id(),
                    error = %err,
                    "Stage error escaped its decorators"
                );
                return Some(TestOutcome::UnexpectedFail);
            }
        }
    }
    None
}
