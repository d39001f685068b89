//! Per-service testing flow state

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use bombard_resilience::FlowCancellation;

use crate::stage::Continuation;

/// Request parameters for one testing flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestParams {
    pub service_name: String,
    pub number_of_users: usize,
    pub number_of_tests: u64,
    pub rate_per_second: u32,
    /// Treat a successful payment as the end of the test
    #[serde(default)]
    pub test_success_by_payment_fact: bool,
    /// End each test right after order creation
    #[serde(default)]
    pub stop_after_order_creation: bool,
}

/// Final classification of one test, used as the metric outcome label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Success,
    Fail,
    Error,
    Retry,
    Stop,
    UnexpectedFail,
}

impl TestOutcome {
    /// Get the metric label for this outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            TestOutcome::Success => "SUCCESS",
            TestOutcome::Fail => "FAIL",
            TestOutcome::Error => "ERROR",
            TestOutcome::Retry => "RETRY",
            TestOutcome::Stop => "STOP",
            TestOutcome::UnexpectedFail => "UNEXPECTED_FAIL",
        }
    }
}

impl From<Continuation> for TestOutcome {
    fn from(continuation: Continuation) -> Self {
        match continuation {
            Continuation::Continue => TestOutcome::Success,
            Continuation::Fail => TestOutcome::Fail,
            Continuation::Error => TestOutcome::Error,
            Continuation::Retry => TestOutcome::Retry,
            Continuation::Stop => TestOutcome::Stop,
        }
    }
}

/// Shared state of one running flow.
///
/// Shared across all workers of one service; the counters are atomic and
/// monotonically non-decreasing.
#[derive(Debug)]
pub struct TestingFlow {
    params: TestParams,
    cancellation: FlowCancellation,
    tests_started: AtomicU64,
    tests_finished: AtomicU64,
}

impl TestingFlow {
    pub fn new(params: TestParams) -> Self {
        Self {
            params,
            cancellation: FlowCancellation::new(),
            tests_started: AtomicU64::new(0),
            tests_finished: AtomicU64::new(0),
        }
    }

    pub fn params(&self) -> &TestParams {
        &self.params
    }

    pub fn cancellation(&self) -> &FlowCancellation {
        &self.cancellation
    }

    /// Claim the next test number, or `None` once the configured count is
    /// exhausted. Claiming increments the started counter atomically so
    /// workers coordinate termination through it.
    pub fn try_claim_test(&self) -> Option<u64> {
        self.tests_started
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |started| {
                (started < self.params.number_of_tests).then_some(started + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Record one finished test
    pub fn test_finished(&self) {
        self.tests_finished.fetch_add(1, Ordering::SeqCst);
    }

    pub fn tests_started(&self) -> u64 {
        self.tests_started.load(Ordering::SeqCst)
    }

    pub fn tests_finished(&self) -> u64 {
        self.tests_finished.load(Ordering::SeqCst)
    }

    /// Point-in-time view of the flow's counters
    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            service_name: self.params.service_name.clone(),
            tests_started: self.tests_started(),
            tests_finished: self.tests_finished(),
            cancelled: self.cancellation.is_cancelled(),
        }
    }
}

/// Counter snapshot returned by the control surface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshot {
    pub service_name: String,
    pub tests_started: u64,
    pub tests_finished: u64,
    pub cancelled: bool,
}
