//! Entity definitions shared across the harness

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// A user created on the target service during pool initialization.
///
/// Users are created once and never deleted; the harness references them by
/// id for the lifetime of a testing flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Initial credit the harness expects the target to honor
    pub account_amount: i64,
}

/// A catalog item, read-only from the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    pub title: String,
    pub price: i64,
    pub amount: i64,
}

/// One line of an order: the item plus the amount placed in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub item: Item,
    pub amount: i64,
}

/// The order lifecycle status as observed on the target.
///
/// Closed set; payload-carrying arms record the timestamps the target
/// reported for the transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderStatus {
    Collecting,
    Discarded,
    Booked,
    Payed {
        /// Epoch millis of the successful payment
        payment_time: i64,
    },
    InDelivery {
        delivery_start_time: i64,
    },
    Delivered {
        delivery_start_time: i64,
        delivery_finish_time: i64,
    },
    Refund,
    Failed {
        reason: String,
        previous: Box<OrderStatus>,
    },
}

impl OrderStatus {
    /// The payload-free discriminant of this status
    pub fn kind(&self) -> StatusKind {
        match self {
            OrderStatus::Collecting => StatusKind::Collecting,
            OrderStatus::Discarded => StatusKind::Discarded,
            OrderStatus::Booked => StatusKind::Booked,
            OrderStatus::Payed { .. } => StatusKind::Payed,
            OrderStatus::InDelivery { .. } => StatusKind::InDelivery,
            OrderStatus::Delivered { .. } => StatusKind::Delivered,
            OrderStatus::Refund => StatusKind::Refund,
            OrderStatus::Failed { .. } => StatusKind::Failed,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Status discriminant used to key the transition table.
///
/// The state machine works over arm identity, not over instances, so payload
/// differences (payment timestamps and the like) never affect legality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Collecting,
    Discarded,
    Booked,
    Payed,
    InDelivery,
    Delivered,
    Refund,
    Failed,
}

impl StatusKind {
    /// Get the string representation of the status kind
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Collecting => "collecting",
            StatusKind::Discarded => "discarded",
            StatusKind::Booked => "booked",
            StatusKind::Payed => "payed",
            StatusKind::InDelivery => "in_delivery",
            StatusKind::Delivered => "delivered",
            StatusKind::Refund => "refund",
            StatusKind::Failed => "failed",
        }
    }

    /// Get all status kinds
    pub fn all() -> &'static [StatusKind] {
        &[
            StatusKind::Collecting,
            StatusKind::Discarded,
            StatusKind::Booked,
            StatusKind::Payed,
            StatusKind::InDelivery,
            StatusKind::Delivered,
            StatusKind::Refund,
            StatusKind::Failed,
        ]
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An order as reported by the target service.
///
/// The harness never mutates orders directly; every change goes through a
/// target API call and the harness re-reads the snapshot afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    /// Epoch millis of order creation on the target
    pub time_created: i64,
    pub status: OrderStatus,
    /// Item id to cart line
    #[serde(default)]
    pub items: HashMap<Uuid, OrderLine>,
    /// Chosen delivery slot in seconds, absent until a slot is set
    #[serde(default)]
    pub delivery_duration: Option<i64>,
    #[serde(default)]
    pub payment_history: Vec<PaymentLogRecord>,
}

impl Order {
    /// Total cost of the cart as currently composed
    pub fn total_cost(&self) -> i64 {
        self.items
            .values()
            .map(|line| line.item.price * line.amount)
            .sum()
    }

    /// Timestamp of the most recent successful payment, if any
    pub fn last_successful_payment(&self) -> Option<&PaymentLogRecord> {
        self.payment_history
            .iter()
            .rev()
            .find(|record| record.status == PaymentStatus::Success)
    }
}

/// Outcome of one payment attempt, appended to the order's payment history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Failed,
    FailedNotEnoughMoney,
    Success,
}

/// Append-only record of a payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLogRecord {
    pub timestamp: i64,
    pub status: PaymentStatus,
    pub amount: i64,
}

/// Kind of a financial ledger entry on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinancialOperationType {
    Deposit,
    Withdraw,
    Refund,
}

/// Append-only financial ledger entry on the target; the harness only reads
/// these to audit withdraw/refund bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialLogRecord {
    #[serde(rename = "type")]
    pub record_type: FinancialOperationType,
    pub amount: i64,
    #[serde(default)]
    pub order_id: Option<Uuid>,
    pub timestamp: i64,
}

/// Abandoned-cart audit record emitted by the target's bucket sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketLogRecord {
    pub transaction_id: Uuid,
    pub timestamp: i64,
    pub user_interacted: bool,
}

/// Result of order finalization: the booking id plus the items the target
/// could not reserve against inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDto {
    pub booking_id: Uuid,
    #[serde(default)]
    pub failed_items: HashSet<Uuid>,
}

/// Per-item booking outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Success,
    Failed,
}

/// Per-item record of a finalization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingLogRecord {
    pub booking_id: Uuid,
    pub item_id: Uuid,
    pub status: BookingStatus,
    pub amount: i64,
    pub timestamp: i64,
}

/// Terminal outcome reported by the target's delivery subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOutcome {
    Success,
    Failure,
}

/// Delivery audit record for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLogRecord {
    pub order_id: Uuid,
    pub outcome: DeliveryOutcome,
}
