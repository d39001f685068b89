//! The order-status transition table and its legality check

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::types::{OrderStatus, StatusKind};

/// Errors raised while checking a transition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The `from` state has no entry in the table at all, which is a
    /// different situation from a known state with an illegal target.
    #[error("unknown order state: {0}")]
    UnknownState(StatusKind),
}

/// Immutable table of legal order-status transitions.
///
/// Configured as a list of `(from, to)` discriminant pairs and indexed by
/// `from` for lookup. Reads are lock-free; the table never changes after
/// construction.
#[derive(Debug, Clone)]
pub struct OrderStateMachine {
    allowed: HashMap<StatusKind, HashSet<StatusKind>>,
}

impl OrderStateMachine {
    /// Build a machine from an explicit list of legal transitions
    pub fn from_transitions(pairs: &[(StatusKind, StatusKind)]) -> Self {
        let mut allowed: HashMap<StatusKind, HashSet<StatusKind>> = HashMap::new();
        for (from, to) in pairs {
            allowed.entry(*from).or_default().insert(*to);
        }
        Self { allowed }
    }

    /// The authoritative transition set for target order lifecycles
    pub fn standard() -> Self {
        use StatusKind::*;

        let mut pairs = vec![
            (Collecting, Booked),
            (Collecting, Discarded),
            // Booking cancelled or payment deadline missed
            (Booked, Collecting),
            // Still awaiting payment within the deadline
            (Booked, Booked),
            (Booked, Payed),
            (Payed, InDelivery),
            (InDelivery, Delivered),
            (InDelivery, Refund),
        ];
        // Any state may fail, recording its previous status
        for kind in StatusKind::all() {
            pairs.push((*kind, Failed));
        }

        Self::from_transitions(&pairs)
    }

    /// Whether `from → to` is a legal transition.
    ///
    /// Returns `Err(UnknownState)` when `from` has no entry in the table and
    /// `Ok(false)` when the state is known but the target is illegal.
    pub fn is_transition_allowed(
        &self,
        from: &OrderStatus,
        to: &OrderStatus,
    ) -> Result<bool, TransitionError> {
        self.is_kind_transition_allowed(from.kind(), to.kind())
    }

    /// Discriminant-level variant of [`is_transition_allowed`](Self::is_transition_allowed)
    pub fn is_kind_transition_allowed(
        &self,
        from: StatusKind,
        to: StatusKind,
    ) -> Result<bool, TransitionError> {
        match self.allowed.get(&from) {
            Some(targets) => Ok(targets.contains(&to)),
            None => Err(TransitionError::UnknownState(from)),
        }
    }

    /// Whether the table explicitly lists a `kind → kind` self-loop
    pub fn has_self_loop(&self, kind: StatusKind) -> bool {
        self.allowed
            .get(&kind)
            .map(|targets| targets.contains(&kind))
            .unwrap_or(false)
    }
}

impl Default for OrderStateMachine {
    fn default() -> Self {
        Self::standard()
    }
}
