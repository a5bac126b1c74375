//! HarvestPay Settlement Engine
//!
//! Settles marketplace orders by splitting one buyer payment across farmer,
//! dispatcher, and platform over one of two rails: an off-chain stablecoin
//! ledger or an on-chain escrow contract.
//!
//! # Flow
//!
//! 1. **Validate**: the order-status state machine admits the transition
//! 2. **Resolve**: map platform users to rail accounts (missing ledger
//!    recipients degrade the batch; missing chain addresses are fatal)
//! 3. **Dispatch**: hand the batch to the selected rail
//! 4. **Confirm**: ledger transfers settle synchronously; chain submissions
//!    park in `AwaitingConfirmation` until an external poller reports a block
//! 5. **Reconcile**: re-fetch authoritative balances from the rail
//! 6. **Commit**: only now does the order status change
//!
//! Failures short-circuit before any status commit, so confirm and cancel
//! are idempotent at the order-status level.
//!
//! # Example
//!
//! ```no_run
//! use settlement::{Orchestrator, Outcome};
//!
//! # async fn run(order: order_core::Order, orch: Orchestrator) -> settlement::Result<()> {
//! match orch.confirm_order(&order).await? {
//!     Outcome::Settled => println!("delivered and paid"),
//!     Outcome::AwaitingConfirmation(handle) => println!("poll {}", handle.hash),
//!     Outcome::SettledWithoutTransfer => println!("no recipients; manual settlement"),
//!     Outcome::UnknownCheckStatus => println!("outcome unknown, check before retry"),
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod store;

// Re-exports
pub use config::{Config, FeeConfig, PolicyConfig};
pub use engine::{Orchestrator, Outcome, RailSet};
pub use error::{Error, Result};
pub use reconcile::Reconciler;
pub use store::{
    BalanceStore, InMemoryBalanceStore, InMemoryDirectory, InMemoryOrderStore, OrderStore,
};
