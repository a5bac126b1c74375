//! Currency conversion and fee math
//!
//! Pure functions, no I/O. All boundaries round explicitly: chain-currency
//! amounts carry 6 decimal places, fiat-equivalent amounts carry 2. Rates
//! are configured constants, not fetched live, so staleness is a deployment
//! concern rather than a runtime one.

use crate::error::{Error, Result};
use crate::types::Order;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places for fiat-equivalent amounts (ZAR)
pub const FIAT_DP: u32 = 2;

/// Decimal places for chain-currency amounts
pub const CHAIN_DP: u32 = 6;

/// Platform fee rate: 2.5% of the base (farmer) amount
pub fn fee_rate() -> Decimal {
    Decimal::new(25, 3)
}

/// Default configured rate: 1 fiat unit = 0.003 chain units
pub fn default_fiat_to_chain_rate() -> Decimal {
    Decimal::new(3, 3)
}

fn round(amount: Decimal, dp: u32) -> Decimal {
    amount.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert between two currencies given their rates against a common base,
/// rounding once at the boundary.
pub fn convert(amount: Decimal, rate_from: Decimal, rate_to: Decimal, dp: u32) -> Result<Decimal> {
    if rate_from <= Decimal::ZERO {
        return Err(Error::InvalidRate(rate_from));
    }
    if rate_to <= Decimal::ZERO {
        return Err(Error::InvalidRate(rate_to));
    }
    Ok(round(amount * rate_to / rate_from, dp))
}

/// Fiat amount to chain units at the configured rate, 6 dp
pub fn to_chain(amount_fiat: Decimal, rate: Decimal) -> Result<Decimal> {
    if rate <= Decimal::ZERO {
        return Err(Error::InvalidRate(rate));
    }
    Ok(round(amount_fiat * rate, CHAIN_DP))
}

/// Chain units back to fiat at the configured rate, 2 dp
pub fn to_fiat(amount_chain: Decimal, rate: Decimal) -> Result<Decimal> {
    if rate <= Decimal::ZERO {
        return Err(Error::InvalidRate(rate));
    }
    Ok(round(amount_chain / rate, FIAT_DP))
}

/// Platform fee: 2.5% of the base amount, rounded to 6 dp
pub fn platform_fee(amount: Decimal) -> Decimal {
    round(amount * fee_rate(), CHAIN_DP)
}

/// How one order's total divides across the three parties.
///
/// Derived from the order at settlement time, never stored independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSplit {
    /// Farmer's share
    pub farmer: Decimal,
    /// Dispatcher's share
    pub dispatcher: Decimal,
    /// Platform fee. Implicit remainder on the ledger rail, added on top
    /// for the chain rail.
    pub platform_fee: Decimal,
    /// Amount the buyer actually sends through the rail
    pub total_value: Decimal,
}

impl PaymentSplit {
    /// Split for the ledger rail: farmer/dispatcher amounts verbatim, the
    /// platform keeps whatever of the total is left over. No fee is deducted
    /// from the transfer itself.
    pub fn for_ledger(order: &Order) -> Result<Self> {
        order.validate_split()?;
        let farmer = round(order.farmer_amount, FIAT_DP);
        let dispatcher = round(order.dispatcher_amount, FIAT_DP);
        Ok(Self {
            farmer,
            dispatcher,
            platform_fee: round(order.total_cost - farmer - dispatcher, FIAT_DP),
            total_value: farmer + dispatcher,
        })
    }

    /// Split for the chain rail: fiat shares converted to chain units, fee
    /// computed on the converted farmer (produce) amount and added on top.
    /// The buyer sends `total_value` as the transaction value.
    pub fn for_chain(order: &Order, rate: Decimal) -> Result<Self> {
        order.validate_split()?;
        let farmer = to_chain(order.farmer_amount, rate)?;
        let dispatcher = to_chain(order.dispatcher_amount, rate)?;
        let fee = platform_fee(farmer);
        Ok(Self {
            farmer,
            dispatcher,
            platform_fee: fee,
            total_value: farmer + dispatcher + fee,
        })
    }

    /// Compensating split for cancellation: a fraction of each earner's
    /// share flows back to the buyer. The fee portion is forfeited.
    pub fn refund_portion(&self, ratio: Decimal, dp: u32) -> Self {
        let farmer = round(self.farmer * ratio, dp);
        let dispatcher = round(self.dispatcher * ratio, dp);
        Self {
            farmer,
            dispatcher,
            platform_fee: Decimal::ZERO,
            total_value: farmer + dispatcher,
        }
    }
}
