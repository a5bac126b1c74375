//! Persistence seams
//!
//! Order and balance persistence are collaborators, not owned state. The
//! traits here are exactly the surface the orchestrator is allowed to touch,
//! and every call happens strictly after a settlement outcome is
//! established. The in-memory implementations back tests and the demo.

use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use order_core::{Balance, OrderId, OrderStatus, PaymentStatus, UserId};
use payment_rails::{RailAccount, RecipientDirectory};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Order persistence collaborator
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Commit a new order status, with the reason when cancelling
    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        cancellation_reason: Option<String>,
    ) -> Result<()>;

    /// Commit a new payment status
    async fn update_payment_status(&self, order_id: OrderId, status: PaymentStatus) -> Result<()>;

    /// Record a confirmed on-chain payment against the order
    async fn update_chain_payment(
        &self,
        order_id: OrderId,
        tx_hash: &str,
        block_number: Option<u64>,
        from_address: &RailAccount,
        amount_paid: Decimal,
    ) -> Result<()>;
}

/// Balance persistence collaborator. Only the reconciler writes through it.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Overwrite the cached balance for a user/token pair
    async fn upsert_balance(
        &self,
        user: UserId,
        token: &str,
        wallet_balance: Decimal,
        ledger_balance: Decimal,
    ) -> Result<()>;
}

/// Recorded chain payment, kept for assertions and audit
#[derive(Debug, Clone, PartialEq)]
pub struct ChainPaymentRecord {
    /// Confirmed transaction hash
    pub tx_hash: String,
    /// Block number, when known
    pub block_number: Option<u64>,
    /// Paying address
    pub from_address: RailAccount,
    /// Value actually paid on-chain
    pub amount_paid: Decimal,
}

/// Per-order persisted state in the in-memory store
#[derive(Debug, Clone, Default)]
pub struct OrderRecord {
    /// Last committed order status
    pub status: Option<OrderStatus>,
    /// Cancellation reason, when cancelled
    pub cancellation_reason: Option<String>,
    /// Last committed payment status
    pub payment_status: Option<PaymentStatus>,
    /// Chain payments recorded against the order
    pub chain_payments: Vec<ChainPaymentRecord>,
}

/// In-memory order store
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, OrderRecord>>,
}

impl InMemoryOrderStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of an order's persisted state
    pub async fn record(&self, order_id: OrderId) -> Option<OrderRecord> {
        self.orders.read().await.get(&order_id).cloned()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        cancellation_reason: Option<String>,
    ) -> Result<()> {
        let mut orders = self.orders.write().await;
        let record = orders.entry(order_id).or_default();
        record.status = Some(status);
        if cancellation_reason.is_some() {
            record.cancellation_reason = cancellation_reason;
        }
        Ok(())
    }

    async fn update_payment_status(&self, order_id: OrderId, status: PaymentStatus) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.entry(order_id).or_default().payment_status = Some(status);
        Ok(())
    }

    async fn update_chain_payment(
        &self,
        order_id: OrderId,
        tx_hash: &str,
        block_number: Option<u64>,
        from_address: &RailAccount,
        amount_paid: Decimal,
    ) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders
            .entry(order_id)
            .or_default()
            .chain_payments
            .push(ChainPaymentRecord {
                tx_hash: tx_hash.to_string(),
                block_number,
                from_address: from_address.clone(),
                amount_paid,
            });
        Ok(())
    }
}

/// In-memory balance store
#[derive(Default)]
pub struct InMemoryBalanceStore {
    balances: RwLock<HashMap<(UserId, String), Balance>>,
}

impl InMemoryBalanceStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached balance for a user/token pair
    pub async fn balance(&self, user: UserId, token: &str) -> Option<Balance> {
        self.balances
            .read()
            .await
            .get(&(user, token.to_string()))
            .cloned()
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn upsert_balance(
        &self,
        user: UserId,
        token: &str,
        wallet_balance: Decimal,
        ledger_balance: Decimal,
    ) -> Result<()> {
        self.balances.write().await.insert(
            (user, token.to_string()),
            Balance {
                user,
                token: token.to_string(),
                wallet_balance,
                ledger_balance,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

/// In-memory recipient directory for tests and demos
#[derive(Default)]
pub struct InMemoryDirectory {
    identifiers: RwLock<HashMap<UserId, RailAccount>>,
    addresses: RwLock<HashMap<UserId, RailAccount>>,
}

impl InMemoryDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ledger payment identifier
    pub async fn insert_identifier(&self, user: UserId, account: RailAccount) {
        self.identifiers.write().await.insert(user, account);
    }

    /// Register a chain payout address
    pub async fn insert_address(&self, user: UserId, account: RailAccount) {
        self.addresses.write().await.insert(user, account);
    }
}

#[async_trait]
impl RecipientDirectory for InMemoryDirectory {
    async fn payment_identifier(
        &self,
        user: UserId,
    ) -> payment_rails::Result<Option<RailAccount>> {
        Ok(self.identifiers.read().await.get(&user).cloned())
    }

    async fn chain_address(&self, user: UserId) -> payment_rails::Result<Option<RailAccount>> {
        Ok(self.addresses.read().await.get(&user).cloned())
    }
}
