//! Test stage contract and decorators
//!
//! A stage is one phase of a test with a single responsibility. It runs
//! against the per-test context and the shared flow dependencies and
//! returns a [`Continuation`] driving the pipeline. Cross-cutting concerns
//! (bounded retries, exception isolation, duration metrics) are layered on
//! as composable wrappers rather than baked into each stage.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use bombard_interfaces::{ApiError, CommerceApi, HarnessMetrics};
use bombard_resilience::CancellationWatch;

use crate::context::TestContext;
use crate::orders::{AuditViolation, OrderCache};
use crate::users::{LedgerError, UserPool};

/// Outcome of one stage execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Advance to the next stage
    Continue,
    /// End the test as a business failure
    Fail,
    /// End the test as an unexpected error
    Error,
    /// Re-execute the same stage
    Retry,
    /// End the test neutrally
    Stop,
}

impl Continuation {
    /// Metric label for this outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            Continuation::Continue => "CONTINUE",
            Continuation::Fail => "FAIL",
            Continuation::Error => "ERROR",
            Continuation::Retry => "RETRY",
            Continuation::Stop => "STOP",
        }
    }

    /// Whether this outcome counts as a failed stage for metric labeling
    pub fn is_fail_state(&self) -> bool {
        matches!(self, Continuation::Fail | Continuation::Error)
    }
}

/// Errors a stage body may raise
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Declared business-failure signal; maps to [`Continuation::Fail`]
    #[error("stage failed: {0}")]
    Failed(String),

    /// Remote or transport failure from the target service
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Harness-side ledger failure
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Anything else; maps to [`Continuation::Error`]
    #[error("{0}")]
    Unexpected(String),
}

impl From<AuditViolation> for StageError {
    fn from(violation: AuditViolation) -> Self {
        match violation {
            AuditViolation::IllegalTransition { .. } => StageError::Failed(violation.to_string()),
            AuditViolation::UnknownState(error) => StageError::Unexpected(error.to_string()),
        }
    }
}

/// Shared collaborators a stage runs against
#[derive(Clone)]
pub struct StageDeps {
    pub api: Arc<dyn CommerceApi>,
    pub users: Arc<UserPool>,
    pub orders: Arc<OrderCache>,
    pub metrics: Arc<dyn HarnessMetrics>,
    pub cancellation: CancellationWatch,
    pub poll_interval: Duration,
}

/// One phase of a test pipeline.
///
/// Stages are stateless with respect to any particular test; all per-test
/// state lives in the [`TestContext`].
#[async_trait]
pub trait TestStage: Send + Sync {
    /// Stage name used for logs and metric labels
    fn name(&self) -> &'static str;

    /// The stage this one wraps, for decorators
    fn wrapped(&self) -> Option<&dyn TestStage> {
        None
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError>;
}

/// Name of the innermost concrete stage, traversing decorator wrappers
pub fn innermost_name(stage: &dyn TestStage) -> &'static str {
    let mut current = stage;
    while let Some(inner) = current.wrapped() {
        current = inner;
    }
    current.name()
}

/// Re-runs the wrapped stage while it requests a retry, up to five
/// executions. Any other outcome passes through unchanged; a final retry
/// request is emitted as [`Continuation::Retry`].
pub struct RetryableStage {
    inner: Box<dyn TestStage>,
    max_attempts: u32,
}

impl RetryableStage {
    pub fn new(inner: Box<dyn TestStage>) -> Self {
        Self {
            inner,
            max_attempts: 5,
        }
    }
}

#[async_trait]
impl TestStage for RetryableStage {
    fn name(&self) -> &'static str {
        "Retryable"
    }

    fn wrapped(&self) -> Option<&dyn TestStage> {
        Some(self.inner.as_ref())
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        for attempt in 1..=self.max_attempts {
            let outcome = self.inner.run(ctx, deps).await?;
            if outcome != Continuation::Retry {
                return Ok(outcome);
            }
            debug!(
                stage = innermost_name(self.inner.as_ref()),
                attempt, "Stage requested retry"
            );
        }
        Ok(Continuation::Retry)
    }
}

/// Catches every error the wrapped stage raises. The declared
/// business-failure signal maps to [`Continuation::Fail`]; anything else
/// maps to [`Continuation::Error`], logged under the innermost stage name.
pub struct ExceptionFreeStage {
    inner: Box<dyn TestStage>,
}

impl ExceptionFreeStage {
    pub fn new(inner: Box<dyn TestStage>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl TestStage for ExceptionFreeStage {
    fn name(&self) -> &'static str {
        "ExceptionFree"
    }

    fn wrapped(&self) -> Option<&dyn TestStage> {
        Some(self.inner.as_ref())
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        match self.inner.run(ctx, deps).await {
            Ok(outcome) => Ok(outcome),
            Err(StageError::Failed(message)) => {
                warn!(
                    stage = innermost_name(self.inner.as_ref()),
                    test = %ctx.test_id(),
                    %message,
                    "Stage failed"
                );
                Ok(Continuation::Fail)
            }
            Err(err) => {
                error!(
                    stage = innermost_name(self.inner.as_ref()),
                    test = %ctx.test_id(),
                    error = %err,
                    "Unexpected stage error"
                );
                Ok(Continuation::Error)
            }
        }
    }
}

/// Times the wrapped stage and records the duration under
/// `{service, stage, outcome}` labels.
pub struct MetricRecordableStage {
    inner: Box<dyn TestStage>,
}

impl MetricRecordableStage {
    pub fn new(inner: Box<dyn TestStage>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl TestStage for MetricRecordableStage {
    fn name(&self) -> &'static str {
        "MetricRecordable"
    }

    fn wrapped(&self) -> Option<&dyn TestStage> {
        Some(self.inner.as_ref())
    }

    async fn run(
        &self,
        ctx: &mut TestContext,
        deps: &StageDeps,
    ) -> Result<Continuation, StageError> {
        let started = tokio::time::Instant::now();
        let result = self.inner.run(ctx, deps).await;
        let outcome = match &result {
            Ok(continuation) => continuation.as_str(),
            Err(_) => "ERROR",
        };
        deps.metrics.record_stage_duration(
            ctx.service_name(),
            innermost_name(self.inner.as_ref()),
            outcome,
            started.elapsed(),
        );
        result
    }
}

/// Standard decorator stack for a pipeline stage
pub fn instrumented(stage: Box<dyn TestStage>) -> Box<dyn TestStage> {
    Box::new(MetricRecordableStage::new(Box::new(
        ExceptionFreeStage::new(stage),
    )))
}

/// Standard decorator stack plus bounded retries
pub fn instrumented_retryable(stage: Box<dyn TestStage>) -> Box<dyn TestStage> {
    Box::new(MetricRecordableStage::new(Box::new(
        ExceptionFreeStage::new(Box::new(RetryableStage::new(stage))),
    )))
}
