//! Order-status state machine
//!
//! Legal transitions form one forward chain with a terminal cancellation
//! branch:
//!
//! ```text
//! pending -> confirmed -> preparing -> ready -> in_transit -> arrived -> delivered
//!                                                             arrived -> cancelled
//!                                                           delivered -> cancelled
//! ```
//!
//! Only `arrived` and `delivered` expose a cancel action to this engine;
//! earlier states are cancelled through a separate flow that never touches
//! settlement. Entering `delivered` demands a confirmed payment for non-cash
//! methods; entering `cancelled` demands a reason and a completed (or
//! legitimately skipped) compensation.

use crate::error::{Error, Result};
use crate::types::{Order, OrderStatus, PaymentMethod, PaymentStatus};
use serde::{Deserialize, Serialize};

/// What a status transition requires from the settlement engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementAction {
    /// No money movement
    None,
    /// Funds must be transferred and confirmed before the commit
    Settle,
    /// A compensating refund must be confirmed before the commit
    Compensate,
}

impl OrderStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Preparing)
                | (Preparing, Ready)
                | (Ready, InTransit)
                | (InTransit, Arrived)
                | (Arrived, Delivered)
                | (Arrived, Cancelled)
                | (Delivered, Cancelled)
        )
    }
}

/// Validate a transition and report the settlement action it requires.
pub fn settlement_action(from: OrderStatus, to: OrderStatus) -> Result<SettlementAction> {
    if !from.can_transition_to(to) {
        return Err(Error::InvalidTransition { from, to });
    }
    Ok(match to {
        OrderStatus::Delivered => SettlementAction::Settle,
        OrderStatus::Cancelled => SettlementAction::Compensate,
        _ => SettlementAction::None,
    })
}

/// Guard for committing `delivered`: non-cash orders must be paid.
pub fn check_delivery_guard(order: &Order) -> Result<()> {
    if order.payment_method != PaymentMethod::Cash && order.payment_status != PaymentStatus::Paid {
        return Err(Error::PaymentNotConfirmed(order.payment_status));
    }
    Ok(())
}

/// Guard for committing `cancelled`: a reason is mandatory.
pub fn check_cancellation_guard(reason: Option<&str>) -> Result<()> {
    match reason {
        Some(r) if !r.trim().is_empty() => Ok(()),
        _ => Err(Error::MissingCancellationReason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderId, UserId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    const FORWARD_CHAIN: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::InTransit,
        OrderStatus::Arrived,
        OrderStatus::Delivered,
    ];

    fn order(method: PaymentMethod, payment_status: PaymentStatus) -> Order {
        Order {
            id: OrderId::new(),
            buyer: UserId::new(),
            farmer: UserId::new(),
            dispatcher: None,
            total_cost: dec!(50),
            farmer_amount: dec!(40),
            dispatcher_amount: dec!(0),
            payment_method: method,
            status: OrderStatus::Arrived,
            payment_status,
            chain_payment: None,
            cancellation_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn forward_chain_is_legal_in_order_only() {
        for pair in FORWARD_CHAIN.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
            assert!(!pair[1].can_transition_to(pair[0]), "{} -> {}", pair[1], pair[0]);
        }
        // No skipping.
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Arrived));
    }

    #[test]
    fn cancel_only_from_arrived_or_delivered() {
        assert!(OrderStatus::Arrived.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        for from in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::InTransit,
        ] {
            assert!(!from.can_transition_to(OrderStatus::Cancelled), "{}", from);
        }
    }

    #[test]
    fn cancelled_is_terminal() {
        for to in FORWARD_CHAIN {
            assert!(!OrderStatus::Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn delivery_requires_settlement_action() {
        assert_eq!(
            settlement_action(OrderStatus::Arrived, OrderStatus::Delivered).unwrap(),
            SettlementAction::Settle
        );
        assert_eq!(
            settlement_action(OrderStatus::Arrived, OrderStatus::Cancelled).unwrap(),
            SettlementAction::Compensate
        );
        assert_eq!(
            settlement_action(OrderStatus::Pending, OrderStatus::Confirmed).unwrap(),
            SettlementAction::None
        );
    }

    #[test]
    fn illegal_transition_is_an_error() {
        let err = settlement_action(OrderStatus::Delivered, OrderStatus::Pending).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn delivery_guard_requires_paid_for_noncash() {
        let unpaid = order(PaymentMethod::LedgerStablecoin, PaymentStatus::Pending);
        assert!(check_delivery_guard(&unpaid).is_err());

        let paid = order(PaymentMethod::OnChain, PaymentStatus::Paid);
        assert!(check_delivery_guard(&paid).is_ok());

        // Cash clears the guard without settlement.
        let cash = order(PaymentMethod::Cash, PaymentStatus::Pending);
        assert!(check_delivery_guard(&cash).is_ok());
    }

    #[test]
    fn cancellation_guard_requires_nonempty_reason() {
        assert!(check_cancellation_guard(Some("buyer unreachable")).is_ok());
        assert!(check_cancellation_guard(Some("   ")).is_err());
        assert!(check_cancellation_guard(None).is_err());
    }
}
