//! Per-test execution context
//!
//! One context exists per virtual test and is owned exclusively by the
//! worker running that test, so none of its state needs synchronization.
//! It is passed explicitly into every stage call.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::stage::StageError;
use crate::stages::{CHANGE_AFTER_FINALIZATION_STAGE, FINALIZING_STAGE};

/// Flow-level switches copied into every test context
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowKnobs {
    /// Treat a successful payment as the end of the test
    pub test_success_by_payment_fact: bool,
    /// End each test right after order creation
    pub stop_after_order_creation: bool,
}

/// Payment bookkeeping accumulated over the test
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentDetails {
    pub attempts: u32,
    pub amount_paid: Option<i64>,
}

/// State of one end-to-end test execution
#[derive(Debug)]
pub struct TestContext {
    test_id: Uuid,
    service_name: String,
    user_id: Option<Uuid>,
    order_id: Option<Uuid>,
    stages_complete: Vec<&'static str>,
    pub payment: PaymentDetails,
    pub was_changed_after_finalization: bool,
    test_start: DateTime<Utc>,
    pub knobs: FlowKnobs,
}

impl TestContext {
    pub fn new(service_name: impl Into<String>, knobs: FlowKnobs) -> Self {
        Self {
            test_id: Uuid::new_v4(),
            service_name: service_name.into(),
            user_id: None,
            order_id: None,
            stages_complete: Vec::new(),
            payment: PaymentDetails::default(),
            was_changed_after_finalization: false,
            test_start: Utc::now(),
            knobs,
        }
    }

    pub fn test_id(&self) -> Uuid {
        self.test_id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn test_start(&self) -> DateTime<Utc> {
        self.test_start
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn order_id(&self) -> Option<Uuid> {
        self.order_id
    }

    /// Bind the test to a user; a context accepts this exactly once
    pub fn assign_user(&mut self, id: Uuid) -> Result<(), StageError> {
        if self.user_id.is_some() {
            return Err(StageError::Unexpected(
                "user id already assigned for this test".to_string(),
            ));
        }
        self.user_id = Some(id);
        Ok(())
    }

    /// Bind the test to an order; a context accepts this exactly once
    pub fn assign_order(&mut self, id: Uuid) -> Result<(), StageError> {
        if self.order_id.is_some() {
            return Err(StageError::Unexpected(
                "order id already assigned for this test".to_string(),
            ));
        }
        self.order_id = Some(id);
        Ok(())
    }

    pub fn require_user(&self) -> Result<Uuid, StageError> {
        self.user_id
            .ok_or_else(|| StageError::Unexpected("no user assigned yet".to_string()))
    }

    pub fn require_order(&self) -> Result<Uuid, StageError> {
        self.order_id
            .ok_or_else(|| StageError::Unexpected("no order created yet".to_string()))
    }

    /// Append a finished stage to the ordered trail
    pub fn mark_stage_complete(&mut self, name: &'static str) {
        self.stages_complete.push(name);
    }

    pub fn stages_complete(&self) -> &[&'static str] {
        &self.stages_complete
    }

    /// Whether the order needs another finalization pass: items changed
    /// after the most recent finalization
    pub fn finalization_needed(&self) -> bool {
        if !self.was_changed_after_finalization {
            return false;
        }
        let last_change = self
            .stages_complete
            .iter()
            .rposition(|name| *name == CHANGE_AFTER_FINALIZATION_STAGE);
        let last_finalize = self
            .stages_complete
            .iter()
            .rposition(|name| *name == FINALIZING_STAGE);
        match (last_change, last_finalize) {
            (Some(change), Some(finalize)) => change > finalize,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}
