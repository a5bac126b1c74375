//! Error types for the settlement engine

use order_core::OrderId;
use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Rail client error, propagated unmodified in kind
    #[error("Rail error: {0}")]
    Rail(#[from] payment_rails::RailError),

    /// Order domain error (illegal transition, bad split, missing reason)
    #[error("Order error: {0}")]
    Core(#[from] order_core::Error),

    /// A settlement attempt is already in flight for this order. The second
    /// call is rejected, never queued.
    #[error("Settlement already in progress for order {0}")]
    AttemptInFlight(OrderId),

    /// No submitted transaction is awaiting confirmation for this order
    #[error("Order {0} has no transaction awaiting confirmation")]
    NotAwaitingConfirmation(OrderId),

    /// Every recipient failed to resolve and the settle-without-transfer
    /// policy is disabled
    #[error("No resolvable recipients for order {0}")]
    RecipientsUnresolved(OrderId),

    /// Recipients resolved but the paying buyer has no rail account, so the
    /// transfer cannot be funded. Never degraded into a skip: somebody is
    /// owed money.
    #[error("Buyer has no rail account to fund order {0}")]
    SenderUnresolved(OrderId),

    /// Persistence collaborator failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}
