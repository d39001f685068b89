//! Test orchestration engine for the bombard load harness
//!
//! The engine drives target e-commerce services through end-to-end order
//! lifecycles at a controlled rate while auditing every observable status
//! transition and the financial bookkeeping around it. A
//! [`TestController`] admits one cancellable flow per service, fans each
//! flow out over worker tasks, and runs the stage pipeline per virtual
//! test with retry, exception-isolation, and metric decorators.

pub mod context;
pub mod controller;
pub mod error;
pub mod flow;
pub mod orders;
pub mod pipeline;
pub mod stage;
pub mod stages;
pub mod users;

pub use context::{FlowKnobs, TestContext};
pub use controller::TestController;
pub use error::ControllerError;
pub use flow::{FlowSnapshot, TestOutcome, TestParams, TestingFlow};
pub use orders::{AuditViolation, OrderCache};
pub use stage::{Continuation, StageDeps, StageError, TestStage};
pub use users::{LedgerError, UserPool};
