//! Shared types for rail clients

use order_core::OrderId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which rail a client speaks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RailKind {
    /// Off-chain stablecoin ledger (REST)
    Ledger,
    /// On-chain escrow contract
    Chain,
    /// In-memory mock for tests and demos
    Mock,
}

impl fmt::Display for RailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RailKind::Ledger => write!(f, "ledger"),
            RailKind::Chain => write!(f, "chain"),
            RailKind::Mock => write!(f, "mock"),
        }
    }
}

/// Opaque rail-level account: a ledger payment identifier or a chain
/// address, depending on the rail that issued it. Never a platform user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RailAccount(String);

impl RailAccount {
    /// Wrap a rail account string
    pub fn new(account: impl Into<String>) -> Self {
        Self(account.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the account string is present and non-blank
    pub fn is_set(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for RailAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a recipient plays in a split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    /// Produce seller
    Farmer,
    /// Delivery dispatcher
    Dispatcher,
    /// Platform fee collector
    Platform,
    /// Buyer receiving a compensating refund
    Buyer,
}

impl fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientRole::Farmer => write!(f, "farmer"),
            RecipientRole::Dispatcher => write!(f, "dispatcher"),
            RecipientRole::Platform => write!(f, "platform"),
            RecipientRole::Buyer => write!(f, "buyer"),
        }
    }
}

/// One payment inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailPayment {
    /// Recipient's role in the split
    pub role: RecipientRole,
    /// Resolved rail account
    pub recipient: RailAccount,
    /// Amount in the rail's currency (fiat 2 dp on the ledger rail,
    /// chain units 6 dp on the chain rail)
    pub amount: Decimal,
}

/// A settlement transfer handed to a rail: one sender, one or more
/// recipients, moved as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferBatch {
    /// Order being settled
    pub order_id: OrderId,
    /// Sender's rail account (the buyer, or an escrow source for refunds)
    pub sender: RailAccount,
    /// Recipients and amounts
    pub payments: Vec<RailPayment>,
    /// Platform fee added on top (chain rail only; zero on the ledger rail)
    pub platform_fee: Decimal,
    /// Human-readable transfer note
    pub note: String,
}

impl TransferBatch {
    /// Total value the sender moves: recipient amounts plus any on-top fee
    pub fn total_value(&self) -> Decimal {
        self.payments.iter().map(|p| p.amount).sum::<Decimal>() + self.platform_fee
    }
}

/// Handle for a submitted but not yet confirmed chain transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle {
    /// Transaction hash
    pub hash: String,
}

/// Confirmation details once a transaction is mined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block number the transaction landed in
    pub block_number: u64,
    /// Confirmed transaction hash
    pub tx_hash: String,
}

/// Authoritative balance reported by a rail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Token name (e.g. "ZARS", "CELO")
    pub token: String,
    /// Wallet balance in the rail's units
    pub balance: Decimal,
}

/// What a rail reports after accepting a transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RailReceipt {
    /// Ledger transfer completed synchronously
    Ledger {
        /// Number of recipient payments executed
        transfers: usize,
    },
    /// Chain transaction submitted; settlement is pending block confirmation
    Chain {
        /// Handle to poll for confirmation
        handle: TxHandle,
    },
}

/// Read-only wallet connection state, owned by an external wallet
/// collaborator. This core never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSession {
    /// Connected wallet address
    pub address: RailAccount,
    /// Connected chain id
    pub chain_id: u64,
}
