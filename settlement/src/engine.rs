//! Payment orchestrator
//!
//! Runs one settlement attempt per order action: validates the status
//! transition, resolves recipients, dispatches to the selected rail, and
//! commits the new order status only after the rail has confirmed. Chain
//! submissions park in an awaiting-confirmation state that an external
//! poller drives to completion; nothing here waits indefinitely.
//!
//! A per-order guard admits exactly one attempt at a time. A second confirm
//! or cancel while one is in flight is rejected, not queued.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::reconcile::Reconciler;
use crate::store::{BalanceStore, OrderStore};
use dashmap::DashMap;
use order_core::money::{PaymentSplit, CHAIN_DP, FIAT_DP};
use order_core::{state, Order, OrderId, OrderStatus, PaymentMethod, PaymentStatus, UserId};
use payment_rails::{
    RailAccount, RailError, RailPayment, RailReceipt, RecipientDirectory, RecipientRole,
    SettlementRail, TransferBatch, TxHandle,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The two rail clients the orchestrator can dispatch to
pub struct RailSet {
    /// Off-chain stablecoin ledger
    pub ledger: Arc<dyn SettlementRail>,
    /// On-chain escrow contract
    pub chain: Arc<dyn SettlementRail>,
}

impl RailSet {
    /// Bundle the two rails
    pub fn new(ledger: Arc<dyn SettlementRail>, chain: Arc<dyn SettlementRail>) -> Self {
        Self { ledger, chain }
    }
}

/// Result of a confirm or cancel action
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Settlement confirmed and the new order status committed
    Settled,
    /// No recipient could be resolved; the order was committed without any
    /// transfer (audited escape valve)
    SettledWithoutTransfer,
    /// A chain transaction was submitted; poll `confirm_transaction` until
    /// it lands. Order status has NOT advanced.
    AwaitingConfirmation(TxHandle),
    /// The transfer call timed out and may or may not have gone through.
    /// Re-check out of band, then `acknowledge_unknown` before retrying.
    UnknownCheckStatus,
}

#[derive(Debug, Clone)]
enum Intent {
    Deliver,
    Cancel { reason: String },
}

#[derive(Debug, Clone)]
enum Attempt {
    ResolvingRecipients,
    RailDispatch,
    AwaitingConfirmation {
        handle: TxHandle,
        intent: Intent,
        from: RailAccount,
        amount: Decimal,
        parties: Vec<(UserId, RailAccount)>,
    },
    Unknown,
}

/// Order settlement orchestrator
pub struct Orchestrator {
    rails: RailSet,
    directory: Arc<dyn RecipientDirectory>,
    orders: Arc<dyn OrderStore>,
    reconciler: Reconciler,
    config: Config,
    attempts: DashMap<OrderId, Attempt>,
}

impl Orchestrator {
    /// Create an orchestrator over the given rails and collaborators
    pub fn new(
        rails: RailSet,
        directory: Arc<dyn RecipientDirectory>,
        orders: Arc<dyn OrderStore>,
        balances: Arc<dyn BalanceStore>,
        config: Config,
    ) -> Self {
        Self {
            rails,
            directory,
            orders,
            reconciler: Reconciler::new(balances),
            config,
            attempts: DashMap::new(),
        }
    }

    /// Whether a settlement attempt is currently in flight for the order
    pub fn is_in_flight(&self, order_id: OrderId) -> bool {
        self.attempts.contains_key(&order_id)
    }

    /// Clear an unknown-outcome guard after the caller has re-checked the
    /// transfer's actual status out of band. Returns false if the order was
    /// not parked in the unknown state.
    pub fn acknowledge_unknown(&self, order_id: OrderId) -> bool {
        self.attempts
            .remove_if(&order_id, |_, attempt| matches!(attempt, Attempt::Unknown))
            .is_some()
    }

    /// Confirm an order: settle its payment and, once the rail confirms,
    /// advance it to `delivered`/`paid`.
    pub async fn confirm_order(&self, order: &Order) -> Result<Outcome> {
        state::settlement_action(order.status, OrderStatus::Delivered)?;
        order.validate_split()?;
        self.begin(order.id)?;

        let result = match order.payment_method {
            PaymentMethod::Cash => self.settle_cash(order).await,
            PaymentMethod::LedgerStablecoin => self.settle_ledger(order).await,
            PaymentMethod::OnChain => self.submit_chain(order, Intent::Deliver).await,
        };
        self.finish(order.id, result)
    }

    /// Cancel an order: run the compensating refund if funds already moved,
    /// then commit `cancelled` with the reason.
    pub async fn cancel_order(&self, order: &Order, reason: &str) -> Result<Outcome> {
        state::check_cancellation_guard(Some(reason))?;
        state::settlement_action(order.status, OrderStatus::Cancelled)?;
        self.begin(order.id)?;

        let result = self.run_cancellation(order, reason).await;
        self.finish(order.id, result)
    }

    /// Drive a parked chain submission one poll forward. Called by the
    /// external confirmation poller; cadence and overall patience are its
    /// concern, not this engine's.
    pub async fn confirm_transaction(&self, order: &Order) -> Result<Outcome> {
        let Some(attempt) = self.attempts.get(&order.id).map(|a| a.clone()) else {
            return Err(Error::NotAwaitingConfirmation(order.id));
        };
        let Attempt::AwaitingConfirmation {
            handle,
            intent,
            from,
            amount,
            parties,
        } = attempt
        else {
            return Err(Error::NotAwaitingConfirmation(order.id));
        };

        match self.rails.chain.check_confirmation(&handle).await {
            Ok(None) => Ok(Outcome::AwaitingConfirmation(handle)),
            Ok(Some(block)) => {
                info!(order = %order.id, tx = %block.tx_hash, block = block.block_number,
                    "chain transaction confirmed");
                self.orders
                    .update_chain_payment(
                        order.id,
                        &block.tx_hash,
                        Some(block.block_number),
                        &from,
                        amount,
                    )
                    .await?;

                match intent {
                    Intent::Deliver => {
                        self.orders
                            .update_payment_status(order.id, PaymentStatus::Paid)
                            .await?;
                        self.reconciler
                            .refresh(self.rails.chain.as_ref(), &parties)
                            .await?;
                        self.commit_delivered(order).await?;
                    }
                    Intent::Cancel { reason } => {
                        self.reconciler
                            .refresh(self.rails.chain.as_ref(), &parties)
                            .await?;
                        self.orders
                            .update_order_status(order.id, OrderStatus::Cancelled, Some(reason))
                            .await?;
                    }
                }
                self.attempts.remove(&order.id);
                Ok(Outcome::Settled)
            }
            Err(RailError::Reverted(tx)) => {
                error!(order = %order.id, tx = %tx, "chain transaction reverted");
                if matches!(intent, Intent::Deliver) {
                    self.orders
                        .update_payment_status(order.id, PaymentStatus::Failed)
                        .await?;
                }
                self.attempts.remove(&order.id);
                Err(RailError::Reverted(tx).into())
            }
            // Transient RPC trouble: the submission is still out there, so
            // the guard stays and the poller tries again.
            Err(e) => Err(e.into()),
        }
    }

    fn begin(&self, order_id: OrderId) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.attempts.entry(order_id) {
            Entry::Occupied(_) => Err(Error::AttemptInFlight(order_id)),
            Entry::Vacant(slot) => {
                slot.insert(Attempt::ResolvingRecipients);
                Ok(())
            }
        }
    }

    /// Release or persist the guard based on how the attempt ended
    fn finish(&self, order_id: OrderId, result: Result<Outcome>) -> Result<Outcome> {
        match &result {
            // Guard persists: either a submission awaits confirmation or
            // the outcome is unknown and must be acknowledged first.
            Ok(Outcome::AwaitingConfirmation(_)) | Ok(Outcome::UnknownCheckStatus) => {}
            _ => {
                self.attempts.remove(&order_id);
            }
        }
        result
    }

    async fn settle_cash(&self, order: &Order) -> Result<Outcome> {
        info!(order = %order.id, "cash order; no settlement transfer");
        self.orders
            .update_order_status(order.id, OrderStatus::Delivered, None)
            .await?;
        Ok(Outcome::Settled)
    }

    async fn settle_ledger(&self, order: &Order) -> Result<Outcome> {
        let split = PaymentSplit::for_ledger(order)?;
        let buyer_account = self.directory.payment_identifier(order.buyer).await?;

        let mut payments = Vec::new();
        let mut parties = Vec::new();
        match self.directory.payment_identifier(order.farmer).await? {
            Some(account) => {
                parties.push((order.farmer, account.clone()));
                payments.push(RailPayment {
                    role: RecipientRole::Farmer,
                    recipient: account,
                    amount: split.farmer,
                });
            }
            None => warn!(order = %order.id, user = %order.farmer,
                "farmer has no payment identifier; excluded from transfer"),
        }
        if let Some(dispatcher) = order.dispatcher {
            if split.dispatcher > Decimal::ZERO {
                match self.directory.payment_identifier(dispatcher).await? {
                    Some(account) => {
                        parties.push((dispatcher, account.clone()));
                        payments.push(RailPayment {
                            role: RecipientRole::Dispatcher,
                            recipient: account,
                            amount: split.dispatcher,
                        });
                    }
                    None => warn!(order = %order.id, user = %dispatcher,
                        "dispatcher has no payment identifier; excluded from transfer"),
                }
            }
        }

        // The escape valve covers only the nobody-to-pay case. An
        // unresolved buyer with payable recipients is a hard failure: the
        // transfer cannot be funded and skipping it would strand real debts.
        if payments.is_empty() {
            return self.settle_without_transfer(order).await;
        }
        let Some(sender) = buyer_account else {
            warn!(order = %order.id, user = %order.buyer,
                "buyer has no payment identifier; cannot fund the transfer");
            return Err(Error::SenderUnresolved(order.id));
        };

        self.attempts.insert(order.id, Attempt::RailDispatch);
        let batch = TransferBatch {
            order_id: order.id,
            sender: sender.clone(),
            payments,
            platform_fee: Decimal::ZERO,
            note: format!("HarvestPay order {}", order.id),
        };

        match self.rails.ledger.transfer(&batch).await {
            Ok(RailReceipt::Ledger { transfers }) => {
                info!(order = %order.id, transfers, "ledger settlement confirmed");
                self.orders
                    .update_payment_status(order.id, PaymentStatus::Paid)
                    .await?;
                parties.push((order.buyer, sender));
                self.reconciler
                    .refresh(self.rails.ledger.as_ref(), &parties)
                    .await?;
                self.commit_delivered(order).await?;
                Ok(Outcome::Settled)
            }
            Ok(RailReceipt::Chain { .. }) => Err(Error::Rail(RailError::Unsupported(
                "ledger rail returned a chain receipt".to_string(),
            ))),
            Err(RailError::AmbiguousTimeout { seconds }) => {
                warn!(order = %order.id, seconds,
                    "ledger transfer outcome unknown; order status unchanged");
                self.attempts.insert(order.id, Attempt::Unknown);
                Ok(Outcome::UnknownCheckStatus)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Escape valve: nothing to transfer because nobody resolved. Kept
    /// observable: distinct outcome, WARN log, and a policy switch to turn
    /// it into a hard failure.
    async fn settle_without_transfer(&self, order: &Order) -> Result<Outcome> {
        if !self.config.policy.settle_without_recipients {
            return Err(Error::RecipientsUnresolved(order.id));
        }
        warn!(order = %order.id,
            "no resolvable recipients; marking settled without transfer");
        self.orders
            .update_payment_status(order.id, PaymentStatus::Paid)
            .await?;
        self.commit_delivered(order).await?;
        Ok(Outcome::SettledWithoutTransfer)
    }

    async fn submit_chain(&self, order: &Order, intent: Intent) -> Result<Outcome> {
        let chain = order
            .chain_payment
            .as_ref()
            .ok_or_else(|| Error::Config(format!("order {} has no chain details", order.id)))?;
        let split = PaymentSplit::for_chain(order, self.config.fees.fiat_to_chain_rate)?;

        let buyer_address = RailAccount::new(chain.buyer_address.clone());
        let mut payments = Vec::new();
        let mut parties = vec![(order.buyer, buyer_address.clone())];

        let (sender, amount) = match &intent {
            Intent::Deliver => {
                let farmer_address = chain
                    .farmer_address
                    .clone()
                    .map(RailAccount::new)
                    .filter(RailAccount::is_set)
                    .ok_or(RailError::RecipientAddressUnset(RecipientRole::Farmer))?;
                parties.push((order.farmer, farmer_address.clone()));
                payments.push(RailPayment {
                    role: RecipientRole::Farmer,
                    recipient: farmer_address,
                    amount: split.farmer,
                });

                if let Some(dispatcher) = order.dispatcher {
                    if split.dispatcher > Decimal::ZERO {
                        let address = chain
                            .dispatcher_address
                            .clone()
                            .map(RailAccount::new)
                            .filter(RailAccount::is_set)
                            .ok_or(RailError::RecipientAddressUnset(RecipientRole::Dispatcher))?;
                        parties.push((dispatcher, address.clone()));
                        payments.push(RailPayment {
                            role: RecipientRole::Dispatcher,
                            recipient: address,
                            amount: split.dispatcher,
                        });
                    }
                }
                (buyer_address.clone(), split.total_value)
            }
            Intent::Cancel { .. } => {
                // Refund path: half the combined escrowed amount flows back
                // to the buyer, funded by the platform account the bridge
                // holds.
                let refund =
                    split.refund_portion(self.config.policy.cancellation_refund_ratio, CHAIN_DP);
                payments.push(RailPayment {
                    role: RecipientRole::Buyer,
                    recipient: buyer_address.clone(),
                    amount: refund.total_value,
                });
                (
                    RailAccount::new(chain.platform_address.clone()),
                    refund.total_value,
                )
            }
        };

        self.attempts.insert(order.id, Attempt::RailDispatch);
        let batch = TransferBatch {
            order_id: order.id,
            sender: sender.clone(),
            payments,
            platform_fee: match &intent {
                Intent::Deliver => split.platform_fee,
                Intent::Cancel { .. } => Decimal::ZERO,
            },
            note: format!("HarvestPay order {}", order.id),
        };

        let submission = match &intent {
            Intent::Deliver => self.rails.chain.transfer(&batch).await,
            Intent::Cancel { .. } => self.rails.chain.refund(&batch).await,
        };
        match submission {
            Ok(RailReceipt::Chain { handle }) => {
                info!(order = %order.id, tx = %handle.hash,
                    "chain transaction submitted; awaiting confirmation");
                self.attempts.insert(
                    order.id,
                    Attempt::AwaitingConfirmation {
                        handle: handle.clone(),
                        intent,
                        from: sender,
                        amount,
                        parties,
                    },
                );
                Ok(Outcome::AwaitingConfirmation(handle))
            }
            Ok(RailReceipt::Ledger { .. }) => Err(Error::Rail(RailError::Unsupported(
                "chain rail returned a ledger receipt".to_string(),
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn run_cancellation(&self, order: &Order, reason: &str) -> Result<Outcome> {
        // Nothing was escrowed or transferred yet: no compensation needed.
        if order.payment_status != PaymentStatus::Paid
            || order.payment_method == PaymentMethod::Cash
        {
            info!(order = %order.id, "cancelling without compensation; no funds moved");
            self.orders
                .update_order_status(order.id, OrderStatus::Cancelled, Some(reason.to_string()))
                .await?;
            return Ok(Outcome::Settled);
        }

        match order.payment_method {
            PaymentMethod::LedgerStablecoin => self.refund_ledger(order, reason).await,
            PaymentMethod::OnChain => {
                self.submit_chain(
                    order,
                    Intent::Cancel {
                        reason: reason.to_string(),
                    },
                )
                .await
            }
            PaymentMethod::Cash => unreachable!("cash handled above"),
        }
    }

    async fn refund_ledger(&self, order: &Order, reason: &str) -> Result<Outcome> {
        let split = PaymentSplit::for_ledger(order)?;
        let refund = split.refund_portion(self.config.policy.cancellation_refund_ratio, FIAT_DP);

        let Some(buyer_account) = self.directory.payment_identifier(order.buyer).await? else {
            // With nobody to refund, the cancellation itself still goes
            // through.
            warn!(order = %order.id,
                "buyer has no payment identifier; cancelling without refund");
            self.orders
                .update_order_status(order.id, OrderStatus::Cancelled, Some(reason.to_string()))
                .await?;
            return Ok(Outcome::SettledWithoutTransfer);
        };

        // One refund entry per reversed share, so the ledger history shows
        // which half is being returned. The payee is the buyer in both.
        let mut payments = Vec::new();
        if refund.farmer > Decimal::ZERO {
            payments.push(RailPayment {
                role: RecipientRole::Buyer,
                recipient: buyer_account.clone(),
                amount: refund.farmer,
            });
        }
        if refund.dispatcher > Decimal::ZERO {
            payments.push(RailPayment {
                role: RecipientRole::Buyer,
                recipient: buyer_account.clone(),
                amount: refund.dispatcher,
            });
        }

        if payments.is_empty() {
            self.orders
                .update_order_status(order.id, OrderStatus::Cancelled, Some(reason.to_string()))
                .await?;
            return Ok(Outcome::Settled);
        }

        self.attempts.insert(order.id, Attempt::RailDispatch);
        let batch = TransferBatch {
            order_id: order.id,
            sender: RailAccount::new(self.config.policy.refund_source_identifier.clone()),
            payments,
            platform_fee: Decimal::ZERO,
            note: format!("HarvestPay refund for order {}: {}", order.id, reason),
        };

        match self.rails.ledger.refund(&batch).await {
            Ok(RailReceipt::Ledger { .. }) => {
                info!(order = %order.id, amount = %refund.total_value,
                    "cancellation refund confirmed");
                let parties = vec![(order.buyer, buyer_account)];
                self.reconciler
                    .refresh(self.rails.ledger.as_ref(), &parties)
                    .await?;
                self.orders
                    .update_order_status(order.id, OrderStatus::Cancelled, Some(reason.to_string()))
                    .await?;
                Ok(Outcome::Settled)
            }
            Ok(RailReceipt::Chain { .. }) => Err(Error::Rail(RailError::Unsupported(
                "ledger rail returned a chain receipt".to_string(),
            ))),
            Err(RailError::AmbiguousTimeout { seconds }) => {
                warn!(order = %order.id, seconds,
                    "refund outcome unknown; order status unchanged");
                self.attempts.insert(order.id, Attempt::Unknown);
                Ok(Outcome::UnknownCheckStatus)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Commit `delivered`. The guard re-checks the delivered-implies-paid
    /// invariant against the payment status just persisted.
    async fn commit_delivered(&self, order: &Order) -> Result<()> {
        let mut settled = order.clone();
        if settled.payment_method != PaymentMethod::Cash {
            settled.payment_status = PaymentStatus::Paid;
        }
        state::check_delivery_guard(&settled)?;
        self.orders
            .update_order_status(order.id, OrderStatus::Delivered, None)
            .await
    }
}
