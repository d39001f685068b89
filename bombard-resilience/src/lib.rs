//! Concurrency control primitives for the bombard harness
//!
//! This crate provides the building blocks the test engine paces and
//! synchronizes itself with: a polling condition awaiter, a slow-start
//! token-bucket rate limiter, and cooperative flow cancellation with
//! quiescence tracking.

pub mod awaiter;
pub mod cancellation;
pub mod rate_limiter;

pub use awaiter::{AwaitOutcome, ConditionAwaiter, DEFAULT_POLL_INTERVAL};
pub use cancellation::{CancellationWatch, FlowCancellation};
pub use rate_limiter::{SlowStartPolicy, SlowStartRateLimiter};
