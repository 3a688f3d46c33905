//! End-to-end arithmetic for the documented trading flows, exercised
//! through the engine's pure decision functions at a 0.001 taker rate.

use chrono::Utc;
use database::model::{Balance, Order, OrderType, Side, TriggerCondition};
use engine::ledger::{apply_deduct, apply_freeze, apply_unfreeze};
use engine::matching::{execution_price, settlement_plan};
use engine::orders::{
    authorize_cancel, check_owner, reservation, trigger_condition_for, validate_request,
    CreateOrderRequest,
};
use engine::EngineError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const TAKER_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001
const MIN_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 4); // 0.0001

fn balance(asset: &str, available: Decimal, locked: Decimal) -> Balance {
    let now = Utc::now().naive_utc();
    Balance {
        id: 1,
        user_id: 42,
        asset: asset.to_string(),
        available,
        locked,
        created_at: now,
        updated_at: now,
    }
}

fn order_request(
    order_type: &str,
    side: &str,
    amount: Decimal,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
) -> CreateOrderRequest {
    CreateOrderRequest {
        symbol: "BTC/USDT".to_string(),
        side: side.to_string(),
        order_type: order_type.to_string(),
        amount,
        price,
        stop_price,
        client_order_id: None,
    }
}

#[test]
fn market_buy_happy_path() {
    // USDT available=10000 locked=5500; ticker last=50000 ask=50010.
    let mut usdt = balance("USDT", dec!(10000), dec!(5500));
    let mut btc = balance("BTC", dec!(0), dec!(0));
    let locked_before_order = usdt.locked;

    let validated =
        validate_request(&order_request("market", "buy", dec!(0.1), None, None), MIN_AMOUNT)
            .unwrap();
    // The reservation prices against the ask settlement will deduct at.
    let (asset, reserved) = reservation(&validated, Some(dec!(50010)), TAKER_RATE).unwrap();
    assert_eq!(asset, "USDT");
    assert_eq!(reserved, dec!(5006.001));
    apply_freeze(&mut usdt, reserved).unwrap();
    assert_eq!(usdt.available, dec!(4993.999));
    assert_eq!(usdt.locked, dec!(10506.001));

    let price = execution_price(
        Side::Buy,
        OrderType::Market,
        None,
        Some(dec!(49990)),
        Some(dec!(50010)),
        "BTC/USDT",
    )
    .unwrap()
    .expect("market buy must execute");
    assert_eq!(price, dec!(50010));

    let plan = settlement_plan(Side::Buy, "BTC", "USDT", dec!(0.1), price, TAKER_RATE);
    let locked_before = usdt.locked;
    apply_deduct(&mut usdt, plan.deduct_amount).unwrap();
    btc.available += plan.credit_amount;

    assert_eq!(locked_before - usdt.locked, dec!(5006.001));
    assert_eq!(btc.available, dec!(0.0999));
    assert_eq!(plan.quote_amount, dec!(5001.0));
    // At an unmoved price the deduction consumes the reservation exactly,
    // so no cushion of previously locked funds is needed and the lock
    // returns to its pre-order level.
    assert_eq!(plan.deduct_amount, reserved);
    assert_eq!(usdt.locked, locked_before_order);
}

#[test]
fn market_buy_settles_with_no_locked_cushion() {
    // The reservation is the only locked quote the user has; settlement at
    // the same ask must still fit inside it.
    let mut usdt = balance("USDT", dec!(6000), dec!(0));
    let ask = dec!(50010);

    let validated =
        validate_request(&order_request("market", "buy", dec!(0.1), None, None), MIN_AMOUNT)
            .unwrap();
    let (_, reserved) = reservation(&validated, Some(ask), TAKER_RATE).unwrap();
    apply_freeze(&mut usdt, reserved).unwrap();

    let plan = settlement_plan(Side::Buy, "BTC", "USDT", dec!(0.1), ask, TAKER_RATE);
    apply_deduct(&mut usdt, plan.deduct_amount).unwrap();
    assert_eq!(usdt.locked, dec!(0));
}

#[test]
fn limit_buy_rests_until_the_ask_crosses() {
    // Freeze 4900 at placement; no fill at ask 50010, fill at ask 48900.
    let mut usdt = balance("USDT", dec!(10000), dec!(4900));

    let validated = validate_request(
        &order_request("limit", "buy", dec!(0.1), Some(dec!(49000)), None),
        MIN_AMOUNT,
    )
    .unwrap();
    let (asset, reserved) = reservation(&validated, None, TAKER_RATE).unwrap();
    assert_eq!((asset.as_str(), reserved), ("USDT", dec!(4900.0)));
    apply_freeze(&mut usdt, reserved).unwrap();

    let resting = execution_price(
        Side::Buy,
        OrderType::Limit,
        Some(dec!(49000)),
        Some(dec!(49990)),
        Some(dec!(50010)),
        "BTC/USDT",
    )
    .unwrap();
    assert_eq!(resting, None, "limit below the ask must stay new");

    let filled = execution_price(
        Side::Buy,
        OrderType::Limit,
        Some(dec!(49000)),
        Some(dec!(48880)),
        Some(dec!(48900)),
        "BTC/USDT",
    )
    .unwrap()
    .expect("crossed limit must fill");
    assert_eq!(filled, dec!(48900));

    // The fee-inclusive deduction fits inside the recorded reservation.
    let plan = settlement_plan(Side::Buy, "BTC", "USDT", dec!(0.1), filled, TAKER_RATE);
    assert_eq!(plan.deduct_amount, dec!(4894.89));
    apply_deduct(&mut usdt, plan.deduct_amount).unwrap();
}

#[test]
fn cancel_releases_the_reservation() {
    let mut btc = balance("BTC", dec!(1), dec!(0));

    let validated = validate_request(
        &order_request("limit", "sell", dec!(0.1), Some(dec!(51000)), None),
        MIN_AMOUNT,
    )
    .unwrap();
    let (asset, reserved) = reservation(&validated, None, TAKER_RATE).unwrap();
    assert_eq!((asset.as_str(), reserved), ("BTC", dec!(0.1)));

    apply_freeze(&mut btc, reserved).unwrap();
    assert_eq!(btc.available, dec!(0.9));
    assert_eq!(btc.locked, dec!(0.1));

    // Cancel refunds exactly the recorded reservation.
    apply_unfreeze(&mut btc, reserved).unwrap();
    assert_eq!(btc.available, dec!(1));
    assert_eq!(btc.locked, dec!(0));
}

#[test]
fn stop_loss_fires_and_settles_from_the_inherited_lock() {
    // Stop-loss sell 0.5 BTC at stop 48000 (<=); last falls to 47500.
    let mut btc = balance("BTC", dec!(0), dec!(0.5));
    let mut usdt = balance("USDT", dec!(0), dec!(0));
    let locked_before_stop = dec!(0); // pre-stop locked, before the 0.5 freeze

    let condition = trigger_condition_for(OrderType::StopLoss, Side::Sell).unwrap();
    assert_eq!(condition, TriggerCondition::LessOrEqual);
    assert!(condition.is_met(dec!(47500), dec!(48000)));
    assert!(!condition.is_met(dec!(48100), dec!(48000)));

    // The spawned child is a market sell; it fills at the bid without
    // re-freezing anything.
    let price = execution_price(
        Side::Sell,
        OrderType::Market,
        None,
        Some(dec!(47500)),
        Some(dec!(47548)),
        "BTC/USDT",
    )
    .unwrap()
    .expect("market sell must execute");
    assert_eq!(price, dec!(47500));

    let plan = settlement_plan(Side::Sell, "BTC", "USDT", dec!(0.5), price, TAKER_RATE);
    apply_deduct(&mut btc, plan.deduct_amount).unwrap();
    usdt.available += plan.credit_amount;

    assert_eq!(usdt.available, dec!(23726.25));
    // Across stop -> child -> fill the base lock returns to its pre-stop
    // value; nothing was double-locked.
    assert_eq!(btc.locked, locked_before_stop);
}

#[test]
fn freeze_fails_before_any_order_exists() {
    // Available 100, limit buy 0.1 at 50000 needs 5000.
    let mut usdt = balance("USDT", dec!(100), dec!(0));

    let validated = validate_request(
        &order_request("limit", "buy", dec!(0.1), Some(dec!(50000)), None),
        MIN_AMOUNT,
    )
    .unwrap();
    let (_, reserved) = reservation(&validated, None, TAKER_RATE).unwrap();
    assert_eq!(reserved, dec!(5000.0));

    let err = apply_freeze(&mut usdt, reserved).unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds { .. }));
    assert_eq!(usdt.available, dec!(100));
    assert_eq!(usdt.locked, dec!(0));
}

fn resting_order(owner_id: i64) -> Order {
    let now = Utc::now().naive_utc();
    Order {
        id: 77,
        user_id: owner_id,
        symbol: "BTC/USDT".to_string(),
        side: "buy".to_string(),
        order_type: "limit".to_string(),
        status: "new".to_string(),
        price: Some(dec!(49000)),
        amount: dec!(0.1),
        filled: dec!(0),
        average_price: None,
        fee: dec!(0),
        fee_asset: None,
        stop_price: None,
        trigger_condition: None,
        parent_order_id: None,
        reserved_amount: Some(dec!(4900)),
        reserved_asset: Some("USDT".to_string()),
        client_order_id: None,
        created_at: now,
        updated_at: now,
        filled_at: None,
        canceled_at: None,
        triggered_at: None,
    }
}

#[test]
fn foreign_cancel_is_rejected_without_mutation() {
    // User 1 owns order X in `new`; user 2 tries to cancel and read it.
    let order = resting_order(1);
    let owner_usdt = balance("USDT", dec!(5100), dec!(4900));
    let available_before = owner_usdt.available;
    let locked_before = owner_usdt.locked;

    // The guard runs before any refund or status write, so a rejection
    // touches neither the order nor the reservation.
    let err = authorize_cancel(&order, 2).unwrap_err();
    assert!(matches!(err, EngineError::NotOwner));
    let err = check_owner(&order, 2).unwrap_err();
    assert!(matches!(err, EngineError::NotOwner));

    assert_eq!(order.status, "new");
    assert_eq!(owner_usdt.available, available_before);
    assert_eq!(owner_usdt.locked, locked_before);

    // The owner passes the same guard.
    assert!(authorize_cancel(&order, 1).is_ok());
}

#[test]
fn settlement_conserves_value_minus_fees() {
    // For a buy: quote spent + base received priced at execution must sum
    // to the notional plus fees on both legs.
    let amount = dec!(0.3);
    let price = dec!(41000);
    let plan = settlement_plan(Side::Buy, "BTC", "USDT", amount, price, TAKER_RATE);

    let quote_spent = plan.deduct_amount;
    let base_received = plan.credit_amount;
    let notional = amount * price;

    assert_eq!(quote_spent - notional, notional * TAKER_RATE);
    assert_eq!(amount - base_received, plan.fee);
}
