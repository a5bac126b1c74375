//! HarvestPay Payment Rails
//!
//! Clients for the two interchangeable settlement rails behind one seam:
//!
//! - **Ledger rail**: off-chain stablecoin ledger fronted by a REST API,
//!   addressed by opaque payment identifiers. Transfers complete
//!   synchronously, with a long timeout whose expiry is an *ambiguous*
//!   outcome, not a failure.
//! - **Chain rail**: on-chain escrow contract paying farmer, dispatcher,
//!   and platform atomically from the buyer's wallet. Submission returns a
//!   transaction handle; settlement exists only once the transaction is
//!   confirmed in a block.
//!
//! The orchestrator depends on [`SettlementRail`] and never branches on the
//! payment method beyond selecting a client.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod chain;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod mock;
pub mod types;

use async_trait::async_trait;

// Re-exports
pub use chain::{ChainClient, ChainRailConfig};
pub use directory::{HttpUserDirectory, RecipientDirectory};
pub use error::{RailError, Result};
pub use ledger::{LedgerClient, LedgerRailConfig};
pub use mock::MockRail;
pub use types::{
    BlockInfo, RailAccount, RailKind, RailPayment, RailReceipt, RecipientRole, TokenBalance,
    TransferBatch, TxHandle, WalletSession,
};

/// One settlement rail, ledger or chain, behind a uniform interface.
#[async_trait]
pub trait SettlementRail: Send + Sync {
    /// Which rail this client speaks for
    fn kind(&self) -> RailKind;

    /// Move funds from the batch sender to its recipients.
    ///
    /// Ledger rail: synchronous; a `Ledger` receipt means the money moved.
    /// Chain rail: submission only; a `Chain` receipt means a transaction
    /// exists but has NOT settled until [`check_confirmation`] reports a
    /// block.
    ///
    /// [`check_confirmation`]: SettlementRail::check_confirmation
    async fn transfer(&self, batch: &TransferBatch) -> Result<RailReceipt>;

    /// Execute a compensating refund batch.
    ///
    /// Rails where a refund is an ordinary transfer from an escrow account
    /// use the default, which delegates to [`transfer`]. The chain rail
    /// overrides it: refunds are funded and signed by the platform account
    /// held at the wallet bridge, never by a connected user wallet.
    ///
    /// [`transfer`]: SettlementRail::transfer
    async fn refund(&self, batch: &TransferBatch) -> Result<RailReceipt> {
        self.transfer(batch).await
    }

    /// Single-shot confirmation poll for a submitted transaction.
    ///
    /// `Ok(None)` means not yet mined; an external poller decides cadence
    /// and overall patience. Reverted transactions surface as
    /// [`RailError::Reverted`].
    async fn check_confirmation(&self, handle: &TxHandle) -> Result<Option<BlockInfo>>;

    /// Authoritative wallet balance for a rail account. Ground truth for
    /// the reconciler; never derived locally.
    async fn balance_of(&self, account: &RailAccount) -> Result<TokenBalance>;
}
