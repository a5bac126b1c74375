//! End-to-end settlement walkthrough over the mock rails.
//!
//! Runs three scenarios against in-memory collaborators: a ledger-rail
//! delivery, an on-chain delivery driven through the confirmation poller,
//! and a cancellation refund. Run with `RUST_LOG=info` for the full trail.

use chrono::Utc;
use order_core::{ChainPayment, Order, OrderId, OrderStatus, PaymentMethod, PaymentStatus, UserId};
use payment_rails::{MockRail, RailAccount};
use rust_decimal::Decimal;
use settlement::store::InMemoryDirectory;
use settlement::{Config, InMemoryBalanceStore, InMemoryOrderStore, Orchestrator, Outcome, RailSet};
use std::sync::Arc;
use tracing::info;

fn order(method: PaymentMethod, total: Decimal, farmer: Decimal, dispatcher: Decimal) -> Order {
    Order {
        id: OrderId::new(),
        buyer: UserId::new(),
        farmer: UserId::new(),
        dispatcher: Some(UserId::new()),
        total_cost: total,
        farmer_amount: farmer,
        dispatcher_amount: dispatcher,
        payment_method: method,
        status: OrderStatus::Arrived,
        payment_status: PaymentStatus::Pending,
        chain_payment: None,
        cancellation_reason: None,
        created_at: Utc::now(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Settlement demo starting...");

    let ledger = Arc::new(MockRail::ledger().with_latency(20));
    let chain = Arc::new(MockRail::chain().with_latency(20).confirm_after(2));
    let directory = Arc::new(InMemoryDirectory::new());
    let orders = Arc::new(InMemoryOrderStore::new());
    let balances = Arc::new(InMemoryBalanceStore::new());

    let orchestrator = Orchestrator::new(
        RailSet::new(ledger.clone(), chain.clone()),
        directory.clone(),
        orders.clone(),
        balances.clone(),
        Config::default(),
    );

    // Scenario 1: ledger-rail delivery with a 70/20 split on a 100 ZARS order.
    let ledger_order = order(
        PaymentMethod::LedgerStablecoin,
        Decimal::new(100, 0),
        Decimal::new(70, 0),
        Decimal::new(20, 0),
    );
    directory
        .insert_identifier(ledger_order.buyer, RailAccount::new("lsk-buyer"))
        .await;
    directory
        .insert_identifier(ledger_order.farmer, RailAccount::new("lsk-farmer"))
        .await;
    if let Some(dispatcher) = ledger_order.dispatcher {
        directory
            .insert_identifier(dispatcher, RailAccount::new("lsk-dispatcher"))
            .await;
    }
    ledger
        .set_balance(RailAccount::new("lsk-buyer"), Decimal::new(150, 0))
        .await;

    let outcome = orchestrator.confirm_order(&ledger_order).await?;
    info!(order = %ledger_order.id, ?outcome, "ledger delivery settled");

    // Scenario 2: on-chain delivery. Submission parks the order awaiting
    // confirmation; the poll loop plays the external confirmation service.
    let mut chain_order = order(
        PaymentMethod::OnChain,
        Decimal::new(100, 0),
        Decimal::new(70, 0),
        Decimal::new(20, 0),
    );
    chain_order.chain_payment = Some(ChainPayment {
        buyer_address: "0xbuyer".to_string(),
        farmer_address: Some("0xfarmer".to_string()),
        dispatcher_address: Some("0xdispatcher".to_string()),
        platform_address: "0xplatform".to_string(),
        tx_hash: None,
        block_number: None,
        amount_paid: None,
    });
    chain
        .set_balance(RailAccount::new("0xbuyer"), Decimal::new(1, 0))
        .await;

    let mut outcome = orchestrator.confirm_order(&chain_order).await?;
    while let Outcome::AwaitingConfirmation(handle) = &outcome {
        info!(tx = %handle.hash, "polling for confirmation");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        outcome = orchestrator.confirm_transaction(&chain_order).await?;
    }
    info!(order = %chain_order.id, ?outcome, "chain delivery settled");

    // Scenario 3: cancel a delivered ledger order; half of each earner's
    // share flows back to the buyer from the escrow account.
    let mut cancelled = ledger_order.clone();
    cancelled.id = OrderId::new();
    cancelled.status = OrderStatus::Delivered;
    cancelled.payment_status = PaymentStatus::Paid;
    ledger
        .set_balance(
            RailAccount::new("lsk-harvestpay-escrow"),
            Decimal::new(1000, 0),
        )
        .await;

    let outcome = orchestrator
        .cancel_order(&cancelled, "produce spoiled in transit")
        .await?;
    info!(order = %cancelled.id, ?outcome, "cancellation settled");

    let record = orders.record(cancelled.id).await;
    info!(?record, "final persisted state");

    info!("Settlement demo complete");
    Ok(())
}
