//! Target-service API contract
//!
//! The narrow set of operations pipeline stages invoke against the system
//! under test. Every call is an asynchronous request-response; failures are
//! remote-or-transport errors that the stage decorators classify.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use bombard_core::{
    BookingDto, BookingLogRecord, BucketLogRecord, DeliveryLogRecord, FinancialLogRecord, Item,
    Order, User,
};

use crate::registry::ServiceDescriptor;

/// Remote call error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("remote error (status {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("response decode error: {message}")]
    Decode { message: String },

    #[error("service unavailable: {message}")]
    Unavailable { message: String },
}

/// Operations the harness consumes from a target e-commerce service
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Create a user with a server-assigned id
    async fn create_user(&self, name: &str, account_amount: i64) -> Result<User, ApiError>;

    /// Fetch a user by id
    async fn get_user(&self, id: Uuid) -> Result<User, ApiError>;

    /// Ordered financial ledger entries for one user and order
    async fn get_financial_history(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<FinancialLogRecord>, ApiError>;

    /// Create a fresh order; the target starts it in collecting state
    async fn create_order(&self, user_id: Uuid) -> Result<Order, ApiError>;

    /// Current snapshot of an order
    async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order, ApiError>;

    /// Catalog items visible to the user
    async fn get_available_items(&self, user_id: Uuid) -> Result<Vec<Item>, ApiError>;

    /// Put an item into the order; the boolean reports whether the target
    /// accepted the change
    async fn put_item_to_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        item_id: Uuid,
        amount: i64,
    ) -> Result<bool, ApiError>;

    /// Finalize the order synchronously, reserving items against inventory
    async fn finalize_order(&self, order_id: Uuid) -> Result<BookingDto, ApiError>;

    /// Available delivery slots in seconds
    async fn get_delivery_slots(&self, order_id: Uuid) -> Result<Vec<i64>, ApiError>;

    /// Choose a delivery slot
    async fn set_delivery_time(&self, order_id: Uuid, time_seconds: i64) -> Result<(), ApiError>;

    /// Pay for the order; returns the order with its updated payment history
    async fn pay_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order, ApiError>;

    /// Kick off delivery simulation on the target
    async fn simulate_delivery(&self, order_id: Uuid) -> Result<(), ApiError>;

    /// Terminal delivery outcome for the order
    async fn delivery_log(&self, order_id: Uuid) -> Result<DeliveryLogRecord, ApiError>;

    /// Abandoned-cart audit records for the order
    async fn abandoned_cart_history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<BucketLogRecord>, ApiError>;

    /// Per-item reservation records for a booking
    async fn get_booking_history(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<BookingLogRecord>, ApiError>;
}

/// Builds a [`CommerceApi`] client for a resolved service descriptor.
///
/// The controller resolves descriptors at flow start and hands them to the
/// factory, keeping the engine independent of any concrete transport.
#[async_trait]
pub trait CommerceApiFactory: Send + Sync {
    async fn connect(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Arc<dyn CommerceApi>, ApiError>;
}
