//! Chain rail client
//!
//! Submits the escrow contract's `processOrderPayment` call through a
//! wallet-bridge collaborator (signing is user-interactive and happens
//! outside this process), then confirms inclusion by polling the node's
//! JSON-RPC endpoint. A submitted transaction is NOT a settlement: only a
//! mined, non-reverted receipt is.
//!
//! The submission request deliberately has no client-side timeout. The user
//! may sit on the signing prompt indefinitely, and abandoning it must not
//! corrupt any state here.
//!
//! Payments are signed by the buyer's connected wallet; refunds are signed
//! by the platform account the bridge holds, with no wallet session at all.

use crate::error::{RailError, Result};
use crate::types::{
    BlockInfo, RailAccount, RailKind, RailReceipt, RecipientRole, TokenBalance, TransferBatch,
    TxHandle, WalletSession,
};
use crate::SettlementRail;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// Unset recipient slot in the contract call
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Chain rail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRailConfig {
    /// Node JSON-RPC endpoint
    pub rpc_url: String,
    /// Wallet-bridge endpoint that owns signing and submission
    pub bridge_url: String,
    /// Escrow contract address
    pub contract_address: String,
    /// Chain ids this deployment accepts (mainnet and testnet)
    pub accepted_chain_ids: Vec<u64>,
    /// Shared authorization secret verified by the contract
    pub auth_secret: String,
    /// Native token name reported in balances
    pub token: String,
    /// Timeout for RPC reads (receipt polls, balance queries)
    pub rpc_timeout_seconds: u64,
}

impl Default for ChainRailConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://forno.celo.org".to_string(),
            bridge_url: "http://localhost:4103".to_string(),
            contract_address: String::new(),
            accepted_chain_ids: vec![42220, 44787],
            auth_secret: String::new(),
            token: "CELO".to_string(),
            rpc_timeout_seconds: 10,
        }
    }
}

impl ChainRailConfig {
    /// Fail fast on environment faults. Missing contract address or secret
    /// is a deployment problem; nothing downstream should retry it.
    pub fn validate(&self) -> Result<()> {
        if self.contract_address.trim().is_empty() {
            return Err(RailError::Config("contract address not set".to_string()));
        }
        if self.auth_secret.trim().is_empty() {
            return Err(RailError::Config("auth secret not set".to_string()));
        }
        if self.accepted_chain_ids.is_empty() {
            return Err(RailError::Config("no accepted chain ids".to_string()));
        }
        Ok(())
    }
}

/// Convert a 6-dp chain amount to an 18-dp integer wei string, exactly
pub fn to_wei(amount: Decimal) -> String {
    let wei_per_unit = Decimal::from(1_000_000_000_000_000_000u64);
    (amount * wei_per_unit).trunc().normalize().to_string()
}

/// Parse a hex wei quantity back to 6-dp chain units
pub fn from_wei_hex(hex: &str) -> Result<Decimal> {
    let trimmed = hex.trim_start_matches("0x");
    let wei = u128::from_str_radix(trimmed, 16)
        .map_err(|e| RailError::Transport(format!("bad wei quantity {}: {}", hex, e)))?;
    let value = Decimal::try_from_i128_with_scale(wei as i128, 18)
        .map_err(|e| RailError::Transport(format!("wei out of range: {}", e)))?;
    Ok(value.round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero))
}

fn parse_hex_u64(hex: &str) -> Result<u64> {
    u64::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| RailError::Transport(format!("bad hex quantity {}: {}", hex, e)))
}

/// On-chain escrow payment client
pub struct ChainClient {
    config: ChainRailConfig,
    wallet: Option<WalletSession>,
    rpc: Client,
    // No timeout: the signing round trip is user-paced.
    bridge: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    tx_hash: String,
}

#[derive(Debug, Deserialize, Default)]
struct BridgeFailure {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    status: String,
    block_number: String,
    transaction_hash: String,
}

impl ChainClient {
    /// Create a chain client. Configuration is validated eagerly.
    pub fn new(config: ChainRailConfig, wallet: Option<WalletSession>) -> Result<Self> {
        config.validate()?;
        let rpc = Client::builder()
            .timeout(Duration::from_secs(config.rpc_timeout_seconds))
            .build()
            .map_err(|e| RailError::Transport(e.to_string()))?;
        let bridge = Client::builder()
            .build()
            .map_err(|e| RailError::Transport(e.to_string()))?;
        Ok(Self {
            config,
            wallet,
            rpc,
            bridge,
        })
    }

    /// Wallet session preconditions, each a distinct failure mode
    fn connected_wallet(&self) -> Result<&WalletSession> {
        let wallet = self.wallet.as_ref().ok_or(RailError::WalletNotConnected)?;
        if !self.config.accepted_chain_ids.contains(&wallet.chain_id) {
            return Err(RailError::WrongNetwork {
                chain_id: wallet.chain_id,
                accepted: self.config.accepted_chain_ids.clone(),
            });
        }
        Ok(wallet)
    }

    /// Submit `processOrderPayment` for the batch. Returns a handle once
    /// the signed transaction has been broadcast; confirmation is the
    /// caller's next step, not this one's.
    ///
    /// The batch sender must be the connected wallet: the wallet signs and
    /// funds the transaction, so a batch naming any other sender would
    /// silently charge the wrong account.
    pub async fn submit_payment(&self, batch: &TransferBatch) -> Result<TxHandle> {
        let wallet = self.connected_wallet()?;
        if batch.sender != wallet.address {
            return Err(RailError::SenderMismatch {
                sender: batch.sender.clone(),
                connected: wallet.address.clone(),
            });
        }

        let farmer = batch
            .payments
            .iter()
            .find(|p| p.role == RecipientRole::Farmer)
            .ok_or(RailError::RecipientAddressUnset(RecipientRole::Farmer))?;
        if !farmer.recipient.is_set() {
            return Err(RailError::RecipientAddressUnset(RecipientRole::Farmer));
        }

        let dispatcher = batch
            .payments
            .iter()
            .find(|p| p.role == RecipientRole::Dispatcher);
        let (dispatcher_addr, dispatcher_amount) = match dispatcher {
            Some(p) if !p.recipient.is_set() => {
                return Err(RailError::RecipientAddressUnset(RecipientRole::Dispatcher));
            }
            Some(p) => (p.recipient.as_str().to_string(), p.amount),
            None => (ZERO_ADDRESS.to_string(), Decimal::ZERO),
        };

        let total_value = batch.total_value();

        info!(
            order = %batch.order_id,
            from = %wallet.address,
            value = %total_value,
            "submitting escrow payment"
        );

        let body = json!({
            "contract": self.config.contract_address,
            "from": wallet.address.as_str(),
            "chainId": wallet.chain_id,
            "method": "processOrderPayment",
            "params": {
                "orderId": batch.order_id.to_string(),
                "farmer": farmer.recipient.as_str(),
                "dispatcher": dispatcher_addr,
                "farmerAmount": to_wei(farmer.amount),
                "dispatcherAmount": to_wei(dispatcher_amount),
                "platformAmount": to_wei(batch.platform_fee),
                "secret": self.config.auth_secret,
            },
            "value": to_wei(total_value),
        });

        self.submit_to_bridge("transactions", body).await
    }

    /// Submit `refundOrderPayment` for the batch. Refunds are funded and
    /// signed by the platform account the bridge holds, so no wallet
    /// session is required and nobody sits on a signing prompt.
    pub async fn submit_refund(&self, batch: &TransferBatch) -> Result<TxHandle> {
        let payee = batch
            .payments
            .first()
            .ok_or_else(|| RailError::Unsupported("empty refund batch".to_string()))?;
        if !payee.recipient.is_set() {
            return Err(RailError::RecipientAddressUnset(payee.role));
        }

        let amount = batch.total_value();

        info!(
            order = %batch.order_id,
            from = %batch.sender,
            recipient = %payee.recipient,
            value = %amount,
            "submitting escrow refund"
        );

        let body = json!({
            "contract": self.config.contract_address,
            "from": batch.sender.as_str(),
            "method": "refundOrderPayment",
            "params": {
                "orderId": batch.order_id.to_string(),
                "recipient": payee.recipient.as_str(),
                "amount": to_wei(amount),
                "secret": self.config.auth_secret,
            },
            "value": to_wei(amount),
        });

        self.submit_to_bridge("refunds", body).await
    }

    async fn submit_to_bridge(&self, path: &str, body: serde_json::Value) -> Result<TxHandle> {
        let url = format!("{}/{}", self.config.bridge_url, path);
        let response = self
            .bridge
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RailError::Transport(e.to_string()))?;

        if response.status().is_success() {
            let submitted: SubmitResponse = response.json().await?;
            return Ok(TxHandle {
                hash: submitted.tx_hash,
            });
        }

        let status = response.status().as_u16();
        let failure: BridgeFailure = response.json().await.unwrap_or_default();
        let message = failure.message.clone().unwrap_or_default();
        Err(match failure.error.as_deref() {
            Some("USER_REJECTED") => RailError::UserRejected,
            Some("INSUFFICIENT_FUNDS") => RailError::InsufficientChainFunds,
            Some("REVERTED") => RailError::Reverted(message),
            _ => RailError::Api { status, message },
        })
    }

    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .rpc
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RailError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RailError::Api { status, message });
        }

        let parsed: RpcResponse<T> = response.json().await?;
        Ok(parsed.result)
    }
}

#[async_trait]
impl SettlementRail for ChainClient {
    fn kind(&self) -> RailKind {
        RailKind::Chain
    }

    async fn transfer(&self, batch: &TransferBatch) -> Result<RailReceipt> {
        let handle = self.submit_payment(batch).await?;
        Ok(RailReceipt::Chain { handle })
    }

    async fn refund(&self, batch: &TransferBatch) -> Result<RailReceipt> {
        let handle = self.submit_refund(batch).await?;
        Ok(RailReceipt::Chain { handle })
    }

    async fn check_confirmation(&self, handle: &TxHandle) -> Result<Option<BlockInfo>> {
        let receipt: Option<Receipt> = self
            .rpc_call("eth_getTransactionReceipt", json!([handle.hash]))
            .await?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };

        if receipt.status == "0x0" {
            warn!(tx = %handle.hash, "transaction reverted on-chain");
            return Err(RailError::Reverted(handle.hash.clone()));
        }

        Ok(Some(BlockInfo {
            block_number: parse_hex_u64(&receipt.block_number)?,
            tx_hash: receipt.transaction_hash,
        }))
    }

    async fn balance_of(&self, account: &RailAccount) -> Result<TokenBalance> {
        let wei: Option<String> = self
            .rpc_call("eth_getBalance", json!([account.as_str(), "latest"]))
            .await?;
        let wei = wei.ok_or_else(|| {
            RailError::Transport("eth_getBalance returned no result".to_string())
        })?;
        Ok(TokenBalance {
            token: self.config.token.clone(),
            balance: from_wei_hex(&wei)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RailPayment;
    use order_core::OrderId;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ChainRailConfig {
        ChainRailConfig {
            rpc_url: format!("{}/rpc", server.uri()),
            bridge_url: server.uri(),
            contract_address: "0xC0FFEE0000000000000000000000000000000001".to_string(),
            accepted_chain_ids: vec![42220, 44787],
            auth_secret: "escrow-secret".to_string(),
            token: "CELO".to_string(),
            rpc_timeout_seconds: 2,
        }
    }

    fn wallet() -> WalletSession {
        WalletSession {
            address: RailAccount::new("0xBuyer000000000000000000000000000000000001"),
            chain_id: 44787,
        }
    }

    fn batch() -> TransferBatch {
        TransferBatch {
            order_id: OrderId::new(),
            sender: RailAccount::new("0xBuyer000000000000000000000000000000000001"),
            payments: vec![
                RailPayment {
                    role: RecipientRole::Farmer,
                    recipient: RailAccount::new("0xFarmer00000000000000000000000000000000001"),
                    amount: dec!(0.210000),
                },
                RailPayment {
                    role: RecipientRole::Dispatcher,
                    recipient: RailAccount::new("0xDispatcher0000000000000000000000000000001"),
                    amount: dec!(0.060000),
                },
            ],
            platform_fee: dec!(0.005250),
            note: "order settlement".to_string(),
        }
    }

    #[test]
    fn wei_conversion_is_exact() {
        assert_eq!(to_wei(dec!(0.275250)), "275250000000000000");
        assert_eq!(to_wei(dec!(0)), "0");
        assert_eq!(to_wei(dec!(1)), "1000000000000000000");
        // 0.25 CELO
        assert_eq!(from_wei_hex("0x3782dace9d90000").unwrap(), dec!(0.250000));
    }

    #[test]
    fn config_validation_fails_fast() {
        let mut cfg = ChainRailConfig::default();
        assert!(matches!(cfg.validate(), Err(RailError::Config(_))));
        cfg.contract_address = "0x1".to_string();
        cfg.auth_secret = "s".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[tokio::test]
    async fn submission_requires_a_connected_wallet() {
        let server = MockServer::start().await;
        let client = ChainClient::new(config(&server), None).unwrap();
        let err = client.submit_payment(&batch()).await.unwrap_err();
        assert!(matches!(err, RailError::WalletNotConnected));
    }

    #[tokio::test]
    async fn submission_rejects_wrong_network() {
        let server = MockServer::start().await;
        let mut session = wallet();
        session.chain_id = 1;
        let client = ChainClient::new(config(&server), Some(session)).unwrap();
        let err = client.submit_payment(&batch()).await.unwrap_err();
        assert!(matches!(err, RailError::WrongNetwork { chain_id: 1, .. }));
    }

    #[tokio::test]
    async fn submission_posts_wei_amounts_and_total_value() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions"))
            .and(body_partial_json(serde_json::json!({
                "method": "processOrderPayment",
                "params": {
                    "farmerAmount": "210000000000000000",
                    "dispatcherAmount": "60000000000000000",
                    "platformAmount": "5250000000000000",
                    "secret": "escrow-secret"
                },
                "value": "275250000000000000"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "txHash": "0xabc" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ChainClient::new(config(&server), Some(wallet())).unwrap();
        let handle = client.submit_payment(&batch()).await.unwrap();
        assert_eq!(handle.hash, "0xabc");
    }

    #[tokio::test]
    async fn submission_rejects_sender_other_than_wallet() {
        let server = MockServer::start().await;
        let client = ChainClient::new(config(&server), Some(wallet())).unwrap();
        let mut b = batch();
        b.sender = RailAccount::new("0xPlatform0000000000000000000000000000001");
        let err = client.submit_payment(&b).await.unwrap_err();
        assert!(matches!(err, RailError::SenderMismatch { .. }));
        // Nothing reached the bridge.
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refund_is_funded_by_the_platform_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refunds"))
            .and(body_partial_json(serde_json::json!({
                "method": "refundOrderPayment",
                "from": "0xPlatform0000000000000000000000000000001",
                "params": {
                    "recipient": "0xBuyer000000000000000000000000000000000001",
                    "amount": "135000000000000000"
                },
                "value": "135000000000000000"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "txHash": "0xdef" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        // No wallet session: refunds never require one.
        let client = ChainClient::new(config(&server), None).unwrap();
        let refund = TransferBatch {
            order_id: OrderId::new(),
            sender: RailAccount::new("0xPlatform0000000000000000000000000000001"),
            payments: vec![RailPayment {
                role: RecipientRole::Buyer,
                recipient: RailAccount::new("0xBuyer000000000000000000000000000000000001"),
                amount: dec!(0.135000),
            }],
            platform_fee: dec!(0),
            note: "cancellation refund".to_string(),
        };
        let handle = client.submit_refund(&refund).await.unwrap();
        assert_eq!(handle.hash, "0xdef");
    }

    #[tokio::test]
    async fn wallet_rejection_is_its_own_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "USER_REJECTED",
                "message": "user dismissed the prompt"
            })))
            .mount(&server)
            .await;

        let client = ChainClient::new(config(&server), Some(wallet())).unwrap();
        let err = client.submit_payment(&batch()).await.unwrap_err();
        assert!(matches!(err, RailError::UserRejected));
    }

    #[tokio::test]
    async fn missing_dispatcher_address_is_fatal_on_chain() {
        let server = MockServer::start().await;
        let client = ChainClient::new(config(&server), Some(wallet())).unwrap();
        let mut b = batch();
        b.payments[1].recipient = RailAccount::new("  ");
        let err = client.submit_payment(&b).await.unwrap_err();
        assert!(matches!(
            err,
            RailError::RecipientAddressUnset(RecipientRole::Dispatcher)
        ));
    }

    #[tokio::test]
    async fn unmined_transaction_is_not_a_settlement() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": null
            })))
            .mount(&server)
            .await;

        let client = ChainClient::new(config(&server), Some(wallet())).unwrap();
        let confirmed = client
            .check_confirmation(&TxHandle {
                hash: "0xabc".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(confirmed, None);
    }

    #[tokio::test]
    async fn mined_receipt_yields_block_info() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": {
                    "status": "0x1",
                    "blockNumber": "0x1b4",
                    "transactionHash": "0xabc"
                }
            })))
            .mount(&server)
            .await;

        let client = ChainClient::new(config(&server), Some(wallet())).unwrap();
        let info = client
            .check_confirmation(&TxHandle {
                hash: "0xabc".to_string(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.block_number, 436);
        assert_eq!(info.tx_hash, "0xabc");
    }

    #[tokio::test]
    async fn reverted_receipt_is_distinct_from_pending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": {
                    "status": "0x0",
                    "blockNumber": "0x1b4",
                    "transactionHash": "0xabc"
                }
            })))
            .mount(&server)
            .await;

        let client = ChainClient::new(config(&server), Some(wallet())).unwrap();
        let err = client
            .check_confirmation(&TxHandle {
                hash: "0xabc".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RailError::Reverted(_)));
    }

    #[tokio::test]
    async fn balance_query_converts_wei() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": "0x3782dace9d90000"
            })))
            .mount(&server)
            .await;

        let client = ChainClient::new(config(&server), Some(wallet())).unwrap();
        let balance = client
            .balance_of(&RailAccount::new("0xFarmer"))
            .await
            .unwrap();
        assert_eq!(balance.token, "CELO");
        assert_eq!(balance.balance, dec!(0.250000));
    }
}
