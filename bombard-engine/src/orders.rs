//! Last-seen order snapshot cache
//!
//! Keyed per service and order, written by whichever stage last read the
//! order from the target. Recording a snapshot is also the audit point for
//! status legality: the `(previous, next)` pair of every observation is
//! checked against the state machine.

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use bombard_core::{Order, OrderStateMachine, StatusKind, TransitionError};
use std::sync::Arc;

/// A snapshot observation the state machine rejected
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditViolation {
    #[error("illegal order transition {from} -> {to} for order {order_id}")]
    IllegalTransition {
        order_id: Uuid,
        from: StatusKind,
        to: StatusKind,
    },

    #[error(transparent)]
    UnknownState(#[from] TransitionError),
}

/// Per-service cache of the last order snapshot each test observed
#[derive(Debug)]
pub struct OrderCache {
    machine: Arc<OrderStateMachine>,
    entries: RwLock<HashMap<(String, Uuid), Order>>,
}

impl OrderCache {
    pub fn new(machine: Arc<OrderStateMachine>) -> Self {
        Self {
            machine,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Last snapshot recorded for an order, if any.
    ///
    /// Stale reads are fine; the target service stays the source of truth
    /// and misses fall through to it.
    pub async fn get(&self, service: &str, order_id: Uuid) -> Option<Order> {
        self.entries
            .read()
            .await
            .get(&(service.to_string(), order_id))
            .cloned()
    }

    /// Record a fresh snapshot, auditing the observed status change.
    ///
    /// A re-read that shows the same status counts as a transition event
    /// only when the table lists the self-loop (an order awaiting payment
    /// legitimately re-reads as booked); other same-status re-reads are
    /// no-ops. The snapshot is returned for further inspection.
    pub async fn observe(&self, service: &str, order: Order) -> Result<Order, AuditViolation> {
        let key = (service.to_string(), order.id);
        let mut entries = self.entries.write().await;

        if let Some(previous) = entries.get(&key) {
            let from = previous.status.kind();
            let to = order.status.kind();
            if from != to || self.machine.has_self_loop(from) {
                if !self.machine.is_kind_transition_allowed(from, to)? {
                    return Err(AuditViolation::IllegalTransition {
                        order_id: order.id,
                        from,
                        to,
                    });
                }
            }
        }

        entries.insert(key, order.clone());
        Ok(order)
    }
}
