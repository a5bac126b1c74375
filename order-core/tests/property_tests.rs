//! Property-based tests for money and state-machine invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conversion round-trip: fiat -> chain -> fiat within one rounding unit
//! - Fee linearity: platform_fee is 2.5% at 6 dp for any amount
//! - Split conservation: ledger splits never move more than the total
//! - Status monotonicity: no path re-enters an earlier status

use order_core::money::{self, PaymentSplit, CHAIN_DP, FIAT_DP};
use order_core::{Order, OrderId, OrderStatus, PaymentMethod, PaymentStatus, UserId};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for fiat amounts: positive, 2 dp, up to 1M
fn fiat_amount_strategy() -> impl Strategy<Value = Decimal> {
    (0u64..100_000_000u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// Strategy for conversion rates: (0.0001, 10.0000]
fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..=100_000u64).prop_map(|ten_thousandths| Decimal::new(ten_thousandths as i64, 4))
}

/// Strategy for order statuses
fn status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Pending),
        Just(OrderStatus::Confirmed),
        Just(OrderStatus::Preparing),
        Just(OrderStatus::Ready),
        Just(OrderStatus::InTransit),
        Just(OrderStatus::Arrived),
        Just(OrderStatus::Delivered),
        Just(OrderStatus::Cancelled),
    ]
}

fn rank(status: OrderStatus) -> u8 {
    match status {
        OrderStatus::Pending => 0,
        OrderStatus::Confirmed => 1,
        OrderStatus::Preparing => 2,
        OrderStatus::Ready => 3,
        OrderStatus::InTransit => 4,
        OrderStatus::Arrived => 5,
        OrderStatus::Delivered => 6,
        OrderStatus::Cancelled => 7,
    }
}

fn ledger_order(total: Decimal, farmer: Decimal, dispatcher: Decimal) -> Order {
    Order {
        id: OrderId::new(),
        buyer: UserId::new(),
        farmer: UserId::new(),
        dispatcher: Some(UserId::new()),
        total_cost: total,
        farmer_amount: farmer,
        dispatcher_amount: dispatcher,
        payment_method: PaymentMethod::LedgerStablecoin,
        status: OrderStatus::Arrived,
        payment_status: PaymentStatus::Pending,
        chain_payment: None,
        cancellation_reason: None,
        created_at: chrono::Utc::now(),
    }
}

proptest! {
    #[test]
    fn conversion_round_trip_bounded(amount in fiat_amount_strategy(), rate in rate_strategy()) {
        let chain = money::to_chain(amount, rate).unwrap();
        let back = money::to_fiat(chain, rate).unwrap();
        // One fiat rounding unit, plus the rounding the chain leg loses when
        // the rate maps a cent below half a chain unit.
        let tolerance = Decimal::new(1, FIAT_DP) + Decimal::new(5, CHAIN_DP + 1) / rate;
        prop_assert!(
            (back - amount).abs() <= tolerance,
            "amount={} rate={} back={}",
            amount, rate, back
        );
    }

    #[test]
    fn fee_is_exactly_two_and_a_half_percent(amount in fiat_amount_strategy()) {
        let fee = money::platform_fee(amount);
        let expected = (amount * Decimal::new(25, 3))
            .round_dp_with_strategy(CHAIN_DP, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
        prop_assert_eq!(fee, expected);
        prop_assert!(fee >= Decimal::ZERO);
    }

    #[test]
    fn ledger_split_conserves_total(
        farmer in fiat_amount_strategy(),
        dispatcher in fiat_amount_strategy(),
        headroom in fiat_amount_strategy(),
    ) {
        let order = ledger_order(farmer + dispatcher + headroom, farmer, dispatcher);
        let split = PaymentSplit::for_ledger(&order).unwrap();
        prop_assert_eq!(split.total_value, split.farmer + split.dispatcher);
        prop_assert!(split.total_value <= order.total_cost);
        prop_assert_eq!(
            split.farmer + split.dispatcher + split.platform_fee,
            order.total_cost
        );
    }

    #[test]
    fn chain_split_value_is_sum_of_parts(
        farmer in fiat_amount_strategy(),
        dispatcher in fiat_amount_strategy(),
        rate in rate_strategy(),
    ) {
        let order = ledger_order(farmer + dispatcher, farmer, dispatcher);
        let split = PaymentSplit::for_chain(&order, rate).unwrap();
        prop_assert_eq!(
            split.total_value,
            split.farmer + split.dispatcher + split.platform_fee
        );
    }

    #[test]
    fn refund_never_exceeds_original(
        farmer in fiat_amount_strategy(),
        dispatcher in fiat_amount_strategy(),
    ) {
        let order = ledger_order(farmer + dispatcher, farmer, dispatcher);
        let split = PaymentSplit::for_ledger(&order).unwrap();
        let refund = split.refund_portion(Decimal::new(5, 1), FIAT_DP);
        prop_assert!(refund.farmer <= split.farmer);
        prop_assert!(refund.dispatcher <= split.dispatcher);
        prop_assert_eq!(refund.platform_fee, Decimal::ZERO);
    }

    #[test]
    fn transitions_never_move_backward(from in status_strategy(), to in status_strategy()) {
        if from.can_transition_to(to) {
            prop_assert!(rank(to) > rank(from));
        }
    }

    #[test]
    fn terminal_states_have_no_successors(to in status_strategy()) {
        prop_assert!(!OrderStatus::Cancelled.can_transition_to(to));
        // Delivered admits only the refund branch.
        if OrderStatus::Delivered.can_transition_to(to) {
            prop_assert_eq!(to, OrderStatus::Cancelled);
        }
    }
}
