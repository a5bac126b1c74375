//! Error types for the order domain

use crate::types::{OrderStatus, PaymentStatus};
use thiserror::Error;

/// Result type for order-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Order domain errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Illegal order-status transition
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: OrderStatus,
        /// Requested status
        to: OrderStatus,
    },

    /// Split amounts exceed the order total
    #[error("Invalid split: farmer {farmer} + dispatcher {dispatcher} exceeds total {total}")]
    InvalidSplit {
        /// Farmer amount
        farmer: rust_decimal::Decimal,
        /// Dispatcher amount
        dispatcher: rust_decimal::Decimal,
        /// Order total
        total: rust_decimal::Decimal,
    },

    /// Cancellation requires a reason
    #[error("Cancellation reason is required")]
    MissingCancellationReason,

    /// Delivery requires a confirmed payment
    #[error("Cannot deliver with payment status {0}")]
    PaymentNotConfirmed(PaymentStatus),

    /// Negative money amount
    #[error("Negative amount: {0}")]
    NegativeAmount(rust_decimal::Decimal),

    /// Conversion rate must be positive
    #[error("Invalid conversion rate: {0}")]
    InvalidRate(rust_decimal::Decimal),
}
