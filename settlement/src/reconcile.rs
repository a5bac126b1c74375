//! Settlement reconciler
//!
//! After a rail confirms a settlement, the cached balances of every affected
//! party are stale. The reconciler re-fetches each one from the rail that
//! owns it and overwrites the cache. It never computes a post-transfer
//! balance by local arithmetic: concurrent unrelated transfers may also be
//! moving the same accounts, and the rail is the only source of truth.

use crate::error::Result;
use crate::store::BalanceStore;
use order_core::UserId;
use payment_rails::{RailAccount, SettlementRail};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Refreshes cached balances from rail ground truth
pub struct Reconciler {
    balances: Arc<dyn BalanceStore>,
}

impl Reconciler {
    /// Create a reconciler writing through the given balance store
    pub fn new(balances: Arc<dyn BalanceStore>) -> Self {
        Self { balances }
    }

    /// Refresh the cached balance of every party in `parties` from `rail`.
    ///
    /// The settlement just confirmed released any provisional hold, so the
    /// ledger-balance column restarts at zero; the wallet figure is whatever
    /// the rail reports right now. Per-party fetch failures are logged and
    /// skipped: reconciliation is best-effort for each party but attempted
    /// for all of them, and a stale cache entry is recoverable while a
    /// blocked settlement commit is not.
    pub async fn refresh(
        &self,
        rail: &dyn SettlementRail,
        parties: &[(UserId, RailAccount)],
    ) -> Result<usize> {
        let mut refreshed = 0;
        for (user, account) in parties {
            match rail.balance_of(account).await {
                Ok(balance) => {
                    self.balances
                        .upsert_balance(*user, &balance.token, balance.balance, Decimal::ZERO)
                        .await?;
                    refreshed += 1;
                }
                Err(e) => {
                    warn!(user = %user, account = %account, error = %e,
                        "balance refresh failed; cache left stale");
                }
            }
        }
        info!(refreshed, total = parties.len(), "reconciled balances");
        Ok(refreshed)
    }
}
