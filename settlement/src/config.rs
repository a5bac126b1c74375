//! Configuration for the settlement engine

use crate::error::{Error, Result};
use payment_rails::{ChainRailConfig, LedgerRailConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Settlement engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Ledger rail settings
    pub ledger: LedgerRailConfig,

    /// Chain rail settings
    pub chain: ChainRailConfig,

    /// Conversion settings
    pub fees: FeeConfig,

    /// Business-policy knobs
    pub policy: PolicyConfig,
}

/// Conversion settings. The platform fee rate itself is fixed at 2.5% in
/// the money engine; only the fiat-to-chain rate is deployment-specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Configured fiat-to-chain rate (1 ZAR = this many chain units).
    /// Static, not fetched live; refreshed by deployment, which makes
    /// staleness an operational concern.
    pub fiat_to_chain_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fiat_to_chain_rate: order_core::money::default_fiat_to_chain_rate(),
        }
    }
}

/// Business-policy knobs that belong to product rules. Explicit here so
/// neither behaves like an accident of the implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Fraction of each earner's share refunded to the buyer on
    /// cancellation. The remainder is forfeited as a penalty.
    pub cancellation_refund_ratio: Decimal,

    /// When no recipient resolves to a rail account, treat the order as
    /// settled without a transfer (manual-settlement escape valve). Every
    /// use is logged at WARN. With this off, the attempt fails instead.
    pub settle_without_recipients: bool,

    /// Ledger escrow account that sources cancellation refunds
    pub refund_source_identifier: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cancellation_refund_ratio: Decimal::new(5, 1),
            settle_without_recipients: true,
            refund_source_identifier: "lsk-harvestpay-escrow".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables over defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(url) = env::var("LEDGER_API_URL") {
            config.ledger.api_url = url;
        }
        if let Ok(timeout) = env::var("LEDGER_TRANSFER_TIMEOUT_SECONDS") {
            config.ledger.transfer_timeout_seconds = timeout
                .parse()
                .map_err(|_| Error::Config(format!("bad transfer timeout: {}", timeout)))?;
        }
        if let Ok(url) = env::var("CHAIN_RPC_URL") {
            config.chain.rpc_url = url;
        }
        if let Ok(url) = env::var("CHAIN_BRIDGE_URL") {
            config.chain.bridge_url = url;
        }
        if let Ok(address) = env::var("ESCROW_CONTRACT_ADDRESS") {
            config.chain.contract_address = address;
        }
        if let Ok(secret) = env::var("ESCROW_AUTH_SECRET") {
            config.chain.auth_secret = secret;
        }
        if let Ok(account) = env::var("REFUND_SOURCE_IDENTIFIER") {
            config.policy.refund_source_identifier = account;
        }
        if let Ok(rate) = env::var("FIAT_TO_CHAIN_RATE") {
            config.fees.fiat_to_chain_rate = rate
                .parse()
                .map_err(|_| Error::Config(format!("bad conversion rate: {}", rate)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("read {}: {}", path.as_ref().display(), e)))?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| Error::Config(format!("parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity checks that do not depend on the chain rail being enabled
    pub fn validate(&self) -> Result<()> {
        let ratio = self.policy.cancellation_refund_ratio;
        if ratio < Decimal::ZERO || ratio > Decimal::ONE {
            return Err(Error::Config(format!(
                "cancellation refund ratio {} outside [0, 1]",
                ratio
            )));
        }
        if self.fees.fiat_to_chain_rate <= Decimal::ZERO {
            return Err(Error::Config(format!(
                "non-positive conversion rate {}",
                self.fees.fiat_to_chain_rate
            )));
        }
        Ok(())
    }
}
