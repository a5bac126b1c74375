//! Ledger rail client
//!
//! Talks to the off-chain stablecoin ledger REST API. A bulk transfer may
//! legitimately take tens of seconds; the configured timeout is long, and
//! when it expires the outcome is *unknown*, which is a different thing from
//! a rejection. Callers get [`RailError::AmbiguousTimeout`] and must re-check
//! before retrying.

use crate::error::{RailError, Result};
use crate::types::{
    BlockInfo, RailAccount, RailKind, RailPayment, RailReceipt, TokenBalance, TransferBatch,
    TxHandle,
};
use crate::SettlementRail;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Ledger rail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRailConfig {
    /// Ledger API base URL
    pub api_url: String,
    /// Stablecoin token name reported in balances
    pub token: String,
    /// Bulk transfer timeout. Long on purpose: the ledger batches
    /// internally and 30-60s completions are normal.
    pub transfer_timeout_seconds: u64,
    /// Timeout for everything that is not a transfer
    pub request_timeout_seconds: u64,
}

impl Default for LedgerRailConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:4102".to_string(),
            token: "ZARS".to_string(),
            transfer_timeout_seconds: 45,
            request_timeout_seconds: 10,
        }
    }
}

/// Off-chain stablecoin ledger client
pub struct LedgerClient {
    config: LedgerRailConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkTransferBody {
    payments: Vec<WirePayment>,
    transaction_notes: String,
}

#[derive(Debug, Serialize)]
struct WirePayment {
    recipient: String,
    amount: Decimal,
}

#[derive(Debug, Deserialize, Default)]
struct FailureBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceBody {
    tokens: Vec<WireToken>,
}

#[derive(Debug, Deserialize)]
struct WireToken {
    name: String,
    balance: Decimal,
}

impl LedgerClient {
    /// Create a ledger client
    pub fn new(config: LedgerRailConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| RailError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Execute a bulk transfer from `sender` to every recipient in
    /// `payments` as one ledger operation.
    pub async fn bulk_transfer(
        &self,
        sender: &RailAccount,
        payments: &[RailPayment],
        note: &str,
    ) -> Result<usize> {
        let url = format!("{}/bulk-transfer/{}", self.config.api_url, sender);
        let body = BulkTransferBody {
            payments: payments
                .iter()
                .map(|p| WirePayment {
                    recipient: p.recipient.as_str().to_string(),
                    amount: p.amount,
                })
                .collect(),
            transaction_notes: note.to_string(),
        };

        info!(
            sender = %sender,
            recipients = payments.len(),
            "submitting ledger bulk transfer"
        );

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.transfer_timeout_seconds))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!(sender = %sender, "ledger transfer timed out; outcome unknown");
                    RailError::AmbiguousTimeout {
                        seconds: self.config.transfer_timeout_seconds,
                    }
                } else {
                    RailError::Transport(e.to_string())
                }
            })?;

        if response.status().is_success() {
            return Ok(payments.len());
        }

        let status = response.status().as_u16();
        let failure: FailureBody = response.json().await.unwrap_or_default();

        // The ledger reports its own internal timeout in the error body.
        // Same ambiguity as a client-side timeout: the transfer may have
        // landed.
        if failure.error.as_deref() == Some("TIMEOUT") {
            warn!(sender = %sender, "ledger reported TIMEOUT; outcome unknown");
            return Err(RailError::AmbiguousTimeout {
                seconds: self.config.transfer_timeout_seconds,
            });
        }

        Err(RailError::Api {
            status,
            message: failure
                .message
                .or(failure.error)
                .unwrap_or_else(|| "transfer rejected".to_string()),
        })
    }

    /// Fetch the authoritative wallet balance for a payment identifier
    pub async fn fetch_balance(&self, account: &RailAccount) -> Result<TokenBalance> {
        let url = format!("{}/balance/{}", self.config.api_url, account);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RailError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RailError::Api { status, message });
        }

        let body: BalanceBody = response.json().await?;
        let token = body
            .tokens
            .into_iter()
            .find(|t| t.name == self.config.token)
            .ok_or_else(|| RailError::Api {
                status: 200,
                message: format!("token {} missing from balance response", self.config.token),
            })?;

        Ok(TokenBalance {
            token: token.name,
            balance: token.balance,
        })
    }
}

#[async_trait]
impl SettlementRail for LedgerClient {
    fn kind(&self) -> RailKind {
        RailKind::Ledger
    }

    async fn transfer(&self, batch: &TransferBatch) -> Result<RailReceipt> {
        if batch.payments.is_empty() {
            return Err(RailError::Unsupported("empty transfer batch".to_string()));
        }
        let transfers = self
            .bulk_transfer(&batch.sender, &batch.payments, &batch.note)
            .await?;
        Ok(RailReceipt::Ledger { transfers })
    }

    async fn check_confirmation(&self, _handle: &TxHandle) -> Result<Option<BlockInfo>> {
        Err(RailError::Unsupported(
            "ledger transfers confirm synchronously".to_string(),
        ))
    }

    async fn balance_of(&self, account: &RailAccount) -> Result<TokenBalance> {
        self.fetch_balance(account).await
    }
}
