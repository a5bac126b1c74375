//! In-memory mock rail for tests and demos
//!
//! Emulates either rail's contract: ledger mode completes transfers
//! synchronously, chain mode hands out transaction handles that confirm
//! after a configurable number of polls. Failures are injected explicitly
//! so scenario tests stay deterministic; a flaky success rate is available
//! for soak-style runs.

use crate::error::{RailError, Result};
use crate::types::{
    BlockInfo, RailAccount, RailKind, RailReceipt, TokenBalance, TransferBatch, TxHandle,
};
use crate::SettlementRail;
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Deterministic failure to inject into the next rail call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Network-level failure
    Transport,
    /// Ambiguous timeout (outcome unknown)
    Timeout,
    /// User rejected the signing prompt
    UserRejected,
    /// Insufficient chain funds
    InsufficientFunds,
    /// Contract revert
    Reverted,
}

impl MockFailure {
    fn into_error(self) -> RailError {
        match self {
            MockFailure::Transport => RailError::Transport("injected failure".to_string()),
            MockFailure::Timeout => RailError::AmbiguousTimeout { seconds: 45 },
            MockFailure::UserRejected => RailError::UserRejected,
            MockFailure::InsufficientFunds => RailError::InsufficientChainFunds,
            MockFailure::Reverted => RailError::Reverted("injected revert".to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    transfers: Vec<TransferBatch>,
    // tx hash -> polls seen so far
    submissions: HashMap<String, u32>,
    balances: HashMap<RailAccount, Decimal>,
    next_failure: Option<MockFailure>,
    next_confirmation_failure: Option<MockFailure>,
}

/// Mock settlement rail
pub struct MockRail {
    mode: RailKind,
    token: String,
    latency_ms: u64,
    success_rate: f64,
    confirm_after_polls: u32,
    state: Arc<RwLock<MockState>>,
}

impl MockRail {
    /// Mock behaving like the ledger rail (synchronous transfers)
    pub fn ledger() -> Self {
        Self::new(RailKind::Ledger, "ZARS")
    }

    /// Mock behaving like the chain rail (submit, then confirm on poll)
    pub fn chain() -> Self {
        Self::new(RailKind::Chain, "CELO")
    }

    fn new(mode: RailKind, token: &str) -> Self {
        Self {
            mode,
            token: token.to_string(),
            latency_ms: 0,
            success_rate: 1.0,
            confirm_after_polls: 1,
            state: Arc::new(RwLock::new(MockState::default())),
        }
    }

    /// Simulated network latency per call
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Random failure injection for soak runs (1.0 = never fail)
    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        self.success_rate = success_rate;
        self
    }

    /// Chain mode: confirm a submission after this many polls
    pub fn confirm_after(mut self, polls: u32) -> Self {
        self.confirm_after_polls = polls;
        self
    }

    /// Inject a deterministic failure into the next transfer
    pub async fn fail_next(&self, failure: MockFailure) {
        self.state.write().await.next_failure = Some(failure);
    }

    /// Inject a deterministic failure into the next confirmation poll
    /// (e.g. a revert surfacing only once the transaction is mined)
    pub async fn fail_next_confirmation(&self, failure: MockFailure) {
        self.state.write().await.next_confirmation_failure = Some(failure);
    }

    /// Seed an account balance
    pub async fn set_balance(&self, account: RailAccount, balance: Decimal) {
        self.state.write().await.balances.insert(account, balance);
    }

    /// Adjust an account balance by a delta (simulates the backing system
    /// moving money)
    pub async fn credit(&self, account: RailAccount, delta: Decimal) {
        let mut state = self.state.write().await;
        *state.balances.entry(account).or_default() += delta;
    }

    /// Every batch this rail accepted, in order
    pub async fn transfers(&self) -> Vec<TransferBatch> {
        self.state.read().await.transfers.clone()
    }

    fn should_succeed(&self) -> bool {
        if self.success_rate >= 1.0 {
            return true;
        }
        rand::thread_rng().gen::<f64>() <= self.success_rate
    }
}

#[async_trait]
impl SettlementRail for MockRail {
    fn kind(&self) -> RailKind {
        self.mode
    }

    async fn transfer(&self, batch: &TransferBatch) -> Result<RailReceipt> {
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }

        let mut state = self.state.write().await;
        if let Some(failure) = state.next_failure.take() {
            return Err(failure.into_error());
        }
        if !self.should_succeed() {
            return Err(RailError::Transport("simulated rail failure".to_string()));
        }

        state.transfers.push(batch.clone());

        // Mirror the backing system: debit sender, credit recipients.
        let total = batch.total_value();
        *state.balances.entry(batch.sender.clone()).or_default() -= total;
        for payment in &batch.payments {
            *state.balances.entry(payment.recipient.clone()).or_default() += payment.amount;
        }

        match self.mode {
            RailKind::Chain => {
                let hash = format!("0xmock{}", Uuid::new_v4().simple());
                state.submissions.insert(hash.clone(), 0);
                info!(tx = %hash, "mock chain submission accepted");
                Ok(RailReceipt::Chain {
                    handle: TxHandle { hash },
                })
            }
            _ => Ok(RailReceipt::Ledger {
                transfers: batch.payments.len(),
            }),
        }
    }

    async fn check_confirmation(&self, handle: &TxHandle) -> Result<Option<BlockInfo>> {
        let mut state = self.state.write().await;
        if let Some(failure) = state.next_confirmation_failure.take() {
            return Err(failure.into_error());
        }
        let polls = state
            .submissions
            .get_mut(&handle.hash)
            .ok_or_else(|| RailError::Transport(format!("unknown tx {}", handle.hash)))?;
        *polls += 1;
        if *polls >= self.confirm_after_polls {
            Ok(Some(BlockInfo {
                block_number: 1_000_000 + u64::from(*polls),
                tx_hash: handle.hash.clone(),
            }))
        } else {
            Ok(None)
        }
    }

    async fn balance_of(&self, account: &RailAccount) -> Result<TokenBalance> {
        let state = self.state.read().await;
        Ok(TokenBalance {
            token: self.token.clone(),
            balance: state.balances.get(account).copied().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RailPayment, RecipientRole};
    use order_core::OrderId;
    use rust_decimal_macros::dec;

    fn batch() -> TransferBatch {
        TransferBatch {
            order_id: OrderId::new(),
            sender: RailAccount::new("buyer"),
            payments: vec![RailPayment {
                role: RecipientRole::Farmer,
                recipient: RailAccount::new("farmer"),
                amount: dec!(70),
            }],
            platform_fee: dec!(0),
            note: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn ledger_mode_settles_synchronously() {
        let rail = MockRail::ledger();
        let receipt = rail.transfer(&batch()).await.unwrap();
        assert_eq!(receipt, RailReceipt::Ledger { transfers: 1 });
        assert_eq!(rail.transfers().await.len(), 1);
    }

    #[tokio::test]
    async fn chain_mode_confirms_after_configured_polls() {
        let rail = MockRail::chain().confirm_after(2);
        let receipt = rail.transfer(&batch()).await.unwrap();
        let RailReceipt::Chain { handle } = receipt else {
            panic!("expected chain receipt");
        };
        assert_eq!(rail.check_confirmation(&handle).await.unwrap(), None);
        let info = rail.check_confirmation(&handle).await.unwrap().unwrap();
        assert_eq!(info.tx_hash, handle.hash);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let rail = MockRail::ledger();
        rail.fail_next(MockFailure::Timeout).await;
        let err = rail.transfer(&batch()).await.unwrap_err();
        assert!(matches!(err, RailError::AmbiguousTimeout { .. }));
        assert!(rail.transfer(&batch()).await.is_ok());
    }

    #[tokio::test]
    async fn injected_confirmation_failure_fires_once() {
        let rail = MockRail::chain();
        let RailReceipt::Chain { handle } = rail.transfer(&batch()).await.unwrap() else {
            panic!("expected chain receipt");
        };
        rail.fail_next_confirmation(MockFailure::Reverted).await;
        let err = rail.check_confirmation(&handle).await.unwrap_err();
        assert!(matches!(err, RailError::Reverted(_)));
        assert!(rail.check_confirmation(&handle).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn balances_track_transfers() {
        let rail = MockRail::ledger();
        rail.set_balance(RailAccount::new("buyer"), dec!(100)).await;
        rail.transfer(&batch()).await.unwrap();
        let buyer = rail.balance_of(&RailAccount::new("buyer")).await.unwrap();
        let farmer = rail.balance_of(&RailAccount::new("farmer")).await.unwrap();
        assert_eq!(buyer.balance, dec!(30));
        assert_eq!(farmer.balance, dec!(70));
    }
}
