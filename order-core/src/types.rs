//! Core types for order settlement

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Create a fresh order ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform user identifier (buyer, farmer, or dispatcher)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Create a fresh user ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the buyer pays for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Off-chain stablecoin ledger transfer
    LedgerStablecoin,
    /// On-chain escrow contract payment
    OnChain,
    /// Cash on delivery (no settlement action)
    Cash,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::LedgerStablecoin => write!(f, "ledger_stablecoin"),
            PaymentMethod::OnChain => write!(f, "on_chain"),
            PaymentMethod::Cash => write!(f, "cash"),
        }
    }
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, awaiting farmer confirmation
    Pending,
    /// Accepted by the farmer
    Confirmed,
    /// Being prepared
    Preparing,
    /// Ready for pickup
    Ready,
    /// Picked up by the dispatcher
    InTransit,
    /// Arrived at the buyer
    Arrived,
    /// Delivered and settled (terminal)
    Delivered,
    /// Cancelled with a reason (terminal)
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Arrived => "arrived",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "in_transit" => Ok(OrderStatus::InTransit),
            "arrived" => Ok(OrderStatus::Arrived),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(format!("unknown order status: {}", s)),
        }
    }
}

/// Payment status, an independent axis from order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No settlement has completed
    Pending,
    /// Settlement confirmed by the rail
    Paid,
    /// Settlement attempt failed
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// On-chain payment details, present only for `PaymentMethod::OnChain`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPayment {
    /// Buyer's wallet address
    pub buyer_address: String,
    /// Farmer's payout address
    pub farmer_address: Option<String>,
    /// Dispatcher's payout address
    pub dispatcher_address: Option<String>,
    /// Platform fee collection address
    pub platform_address: String,
    /// Submitted transaction hash
    pub tx_hash: Option<String>,
    /// Block the transaction was mined in
    pub block_number: Option<u64>,
    /// Amount actually paid on-chain (chain units)
    pub amount_paid: Option<Decimal>,
}

/// One marketplace purchase, the aggregate this engine settles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID
    pub id: OrderId,
    /// Buyer (payer)
    pub buyer: UserId,
    /// Farmer (primary payee)
    pub farmer: UserId,
    /// Dispatcher, assigned later by an external claim process
    pub dispatcher: Option<UserId>,
    /// Total cost in the settlement currency (ZAR)
    pub total_cost: Decimal,
    /// Farmer's share of the total
    pub farmer_amount: Decimal,
    /// Dispatcher's share of the total
    pub dispatcher_amount: Decimal,
    /// Payment rail chosen by the buyer
    pub payment_method: PaymentMethod,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Settlement status
    pub payment_status: PaymentStatus,
    /// On-chain details when `payment_method == OnChain`
    pub chain_payment: Option<ChainPayment>,
    /// Required when status is `Cancelled`
    pub cancellation_reason: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Validate the split against the order total.
    ///
    /// On the ledger rail the platform share is implicit, so farmer +
    /// dispatcher must fit inside the total. The chain rail adds the fee on
    /// top, so only non-negativity is checked there.
    pub fn validate_split(&self) -> crate::error::Result<()> {
        if self.farmer_amount.is_sign_negative() {
            return Err(crate::error::Error::NegativeAmount(self.farmer_amount));
        }
        if self.dispatcher_amount.is_sign_negative() {
            return Err(crate::error::Error::NegativeAmount(self.dispatcher_amount));
        }
        if self.payment_method == PaymentMethod::LedgerStablecoin
            && self.farmer_amount + self.dispatcher_amount > self.total_cost
        {
            return Err(crate::error::Error::InvalidSplit {
                farmer: self.farmer_amount,
                dispatcher: self.dispatcher_amount,
                total: self.total_cost,
            });
        }
        Ok(())
    }

    /// Parties credited by a successful settlement of this order
    pub fn payees(&self) -> Vec<UserId> {
        let mut parties = vec![self.farmer];
        if let Some(dispatcher) = self.dispatcher {
            parties.push(dispatcher);
        }
        parties
    }
}

/// Cached per-user, per-token balance.
///
/// Balances are caches of ground truth held by the backing rail. The
/// reconciler refreshes them after settlement; nothing computes them forward
/// speculatively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Balance owner
    pub user: UserId,
    /// Token or currency name
    pub token: String,
    /// Spendable now
    pub wallet_balance: Decimal,
    /// Provisionally held for pending orders. Negative for a buyer (money
    /// earmarked to pay), positive for an earner (money owed).
    pub ledger_balance: Decimal,
    /// Last refresh time
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(method: PaymentMethod) -> Order {
        Order {
            id: OrderId::new(),
            buyer: UserId::new(),
            farmer: UserId::new(),
            dispatcher: Some(UserId::new()),
            total_cost: dec!(100),
            farmer_amount: dec!(70),
            dispatcher_amount: dec!(20),
            payment_method: method,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            chain_payment: None,
            cancellation_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn ledger_split_within_total_is_valid() {
        let o = order(PaymentMethod::LedgerStablecoin);
        assert!(o.validate_split().is_ok());
    }

    #[test]
    fn ledger_split_exceeding_total_is_rejected() {
        let mut o = order(PaymentMethod::LedgerStablecoin);
        o.farmer_amount = dec!(90);
        assert!(matches!(
            o.validate_split(),
            Err(crate::Error::InvalidSplit { .. })
        ));
    }

    #[test]
    fn chain_split_may_exceed_total() {
        // Fee is added on top for the chain rail, not carved out of the total.
        let mut o = order(PaymentMethod::OnChain);
        o.farmer_amount = dec!(90);
        assert!(o.validate_split().is_ok());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let mut o = order(PaymentMethod::LedgerStablecoin);
        o.dispatcher_amount = dec!(-1);
        assert!(matches!(
            o.validate_split(),
            Err(crate::Error::NegativeAmount(_))
        ));
    }

    #[test]
    fn order_status_round_trips_through_str() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::InTransit,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let parsed: OrderStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn payees_excludes_unassigned_dispatcher() {
        let mut o = order(PaymentMethod::LedgerStablecoin);
        o.dispatcher = None;
        assert_eq!(o.payees(), vec![o.farmer]);
    }
}
