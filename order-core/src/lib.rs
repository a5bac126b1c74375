//! HarvestPay Order Core
//!
//! Domain model for marketplace order settlement: the order aggregate, the
//! order-status state machine, balances, and the currency/fee math used to
//! split one buyer payment across farmer, dispatcher, and platform.
//!
//! # Invariants
//!
//! - `Delivered` implies `Paid` for every non-cash payment method
//! - `Cancelled` implies a non-empty cancellation reason
//! - farmer + dispatcher amounts never exceed the order total on the ledger rail
//! - Money math rounds at every conversion boundary, never chaining unrounded
//!   multiplications

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod money;
pub mod state;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use money::{platform_fee, to_chain, to_fiat, PaymentSplit};
pub use state::SettlementAction;
pub use types::{
    Balance, ChainPayment, Order, OrderId, OrderStatus, PaymentMethod, PaymentStatus, UserId,
};
