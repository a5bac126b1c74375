//! Error types for rail clients
//!
//! The taxonomy matters more than usual here: callers branch on these
//! variants to decide whether an order is retryable, ambiguous, or must
//! surface a specific wallet message. Variants are never collapsed into a
//! generic failure.

use thiserror::Error;

/// Result type for rail operations
pub type Result<T> = std::result::Result<T, RailError>;

/// Rail client errors
#[derive(Error, Debug)]
pub enum RailError {
    /// A recipient could not be resolved to a rail account. Non-fatal at
    /// call sites that degrade to a partial batch.
    #[error("No rail account for user {0}")]
    RecipientUnresolved(order_core::UserId),

    /// A required recipient chain address is unset on the order
    #[error("Chain address unset for {0}")]
    RecipientAddressUnset(crate::types::RecipientRole),

    /// Network-level failure reaching the rail
    #[error("Transport error: {0}")]
    Transport(String),

    /// The rail rejected the request
    #[error("Rail API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the rail
        message: String,
    },

    /// The transfer call exceeded its timeout. The outcome is UNKNOWN: the
    /// transfer may have succeeded. Never retried blindly.
    #[error("Transfer timed out after {seconds}s; outcome unknown, re-check before retrying")]
    AmbiguousTimeout {
        /// Configured timeout that elapsed
        seconds: u64,
    },

    /// No wallet is connected
    #[error("Wallet not connected")]
    WalletNotConnected,

    /// The batch names a sender the connected wallet cannot pay for
    #[error("Batch sender {sender} does not match connected wallet {connected}")]
    SenderMismatch {
        /// Sender the batch declared
        sender: crate::types::RailAccount,
        /// Address of the connected wallet
        connected: crate::types::RailAccount,
    },

    /// Wallet connected to an unsupported network
    #[error("Wrong network: connected to chain {chain_id}, accepted {accepted:?}")]
    WrongNetwork {
        /// Connected chain id
        chain_id: u64,
        /// Chain ids this deployment accepts
        accepted: Vec<u64>,
    },

    /// The user rejected the signing prompt
    #[error("Transaction rejected in wallet")]
    UserRejected,

    /// Insufficient funds in the connected wallet
    #[error("Insufficient funds for on-chain payment")]
    InsufficientChainFunds,

    /// The contract reverted the transaction (no partial payment occurred)
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// Missing or invalid deployment configuration. A startup fault, not a
    /// retryable runtime condition.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested operation does not exist on this rail
    #[error("Unsupported on this rail: {0}")]
    Unsupported(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RailError {
    /// Whether a caller may retry the same request without an out-of-band
    /// status check first. `AmbiguousTimeout` is the one outcome where a
    /// blind retry risks double payment.
    pub fn safe_to_retry(&self) -> bool {
        !matches!(self, RailError::AmbiguousTimeout { .. })
    }
}
