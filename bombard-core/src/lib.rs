//! Core domain model for the bombard load harness
//!
//! This crate holds the entities observed on target e-commerce services
//! (users, items, orders, audit log records) and the order state machine
//! that declares which status transitions a target is allowed to exhibit.

pub mod state_machine;
pub mod types;

// Re-export main types
pub use state_machine::{OrderStateMachine, TransitionError};
pub use types::{
    BookingDto, BookingLogRecord, BookingStatus, BucketLogRecord, DeliveryLogRecord,
    DeliveryOutcome, FinancialLogRecord, FinancialOperationType, Item, Order, OrderLine,
    OrderStatus, PaymentLogRecord, PaymentStatus, StatusKind, User,
};
