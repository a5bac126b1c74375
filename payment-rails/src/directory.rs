//! Recipient resolution
//!
//! Rails address parties by rail accounts, not platform user ids. The
//! directory maps a user id to whichever account the rail needs, returning
//! `None` when the user never set one up. Missing accounts are a data
//! condition, not an error; callers decide whether to degrade or fail.

use crate::error::{RailError, Result};
use crate::types::RailAccount;
use async_trait::async_trait;
use order_core::UserId;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Maps platform users to rail accounts
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Ledger payment identifier for a user, if set
    async fn payment_identifier(&self, user: UserId) -> Result<Option<RailAccount>>;

    /// Chain payout address for a user, if set
    async fn chain_address(&self, user: UserId) -> Result<Option<RailAccount>>;
}

/// User lookup API client (collaborator service)
pub struct HttpUserDirectory {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    #[serde(default)]
    payment_identifier: Option<String>,
    #[serde(default)]
    lisk_id: Option<String>,
    #[serde(default)]
    celo_address: Option<String>,
}

impl HttpUserDirectory {
    /// Create a directory client against the user lookup API
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| RailError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    async fn fetch_record(&self, user: UserId) -> Result<Option<UserRecord>> {
        let url = format!("{}/users/{}", self.base_url, user);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RailError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RailError::Api { status, message });
        }

        let record: UserRecord = response.json().await?;
        Ok(Some(record))
    }
}

#[async_trait]
impl RecipientDirectory for HttpUserDirectory {
    async fn payment_identifier(&self, user: UserId) -> Result<Option<RailAccount>> {
        let account = self.fetch_record(user).await?.and_then(|record| {
            record
                .payment_identifier
                .or(record.lisk_id)
                .filter(|id| !id.trim().is_empty())
                .map(RailAccount::new)
        });
        if account.is_none() {
            debug!(user = %user, "no payment identifier on record");
        }
        Ok(account)
    }

    async fn chain_address(&self, user: UserId) -> Result<Option<RailAccount>> {
        let account = self.fetch_record(user).await?.and_then(|record| {
            record
                .celo_address
                .filter(|addr| !addr.trim().is_empty())
                .map(RailAccount::new)
        });
        if account.is_none() {
            debug!(user = %user, "no chain address on record");
        }
        Ok(account)
    }
}
