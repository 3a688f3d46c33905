//! CCXT response shaping. Internal rows carry fixed-point decimals; the
//! wire format uses the plain JSON numbers CCXT clients expect.

use chrono::NaiveDateTime;
use database::{Balance, Kline, Order, Ticker, Trade};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use engine::symbol;

fn number(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn timestamp_ms(at: NaiveDateTime) -> i64 {
    at.and_utc().timestamp_millis()
}

fn datetime(at: NaiveDateTime) -> String {
    at.and_utc().to_rfc3339()
}

pub fn ticker(ticker: &Ticker) -> Value {
    json!({
        "symbol": ticker.symbol,
        "timestamp": timestamp_ms(ticker.updated_at),
        "datetime": datetime(ticker.updated_at),
        "last": number(ticker.last_price),
        "close": number(ticker.last_price),
        "high": number(ticker.high_24h.unwrap_or(Decimal::ZERO)),
        "low": number(ticker.low_24h.unwrap_or(Decimal::ZERO)),
        // Fall back to last when the synthetic book side is absent.
        "bid": number(ticker.bid_price.unwrap_or(ticker.last_price)),
        "ask": number(ticker.ask_price.unwrap_or(ticker.last_price)),
        "baseVolume": number(ticker.volume_24h_base.unwrap_or(Decimal::ZERO)),
        "quoteVolume": number(ticker.volume_24h_quote.unwrap_or(Decimal::ZERO)),
        "info": {},
    })
}

pub fn order(order: &Order) -> Value {
    json!({
        "id": order.id.to_string(),
        "clientOrderId": order.client_order_id.clone().unwrap_or_default(),
        "timestamp": timestamp_ms(order.created_at),
        "datetime": datetime(order.created_at),
        "symbol": order.symbol,
        "type": order.order_type,
        "side": order.side,
        "price": order.price.map(number),
        "stopPrice": order.stop_price.map(number),
        "amount": number(order.amount),
        "filled": number(order.filled),
        "remaining": number(order.remaining()),
        "average": order.average_price.map(number),
        "status": order.status,
        "fee": {
            "cost": number(order.fee),
            "currency": order.fee_asset.clone().unwrap_or_default(),
        },
    })
}

pub fn trade(trade: &Trade) -> Value {
    json!({
        "id": trade.id.to_string(),
        "order": trade.order_id.to_string(),
        "symbol": trade.symbol,
        "side": trade.side,
        "price": number(trade.price),
        "amount": number(trade.amount),
        "cost": number(trade.quote_amount),
        "timestamp": timestamp_ms(trade.created_at),
        "datetime": datetime(trade.created_at),
        "fee": {
            "cost": number(trade.fee),
            "currency": trade.fee_asset.clone().unwrap_or_default(),
        },
    })
}

/// CCXT `fetchBalance` shape: one entry per asset.
pub fn balances(rows: &[Balance]) -> Value {
    let mut result = Map::new();
    for row in rows {
        result.insert(
            row.asset.clone(),
            json!({
                "free": number(row.available),
                "used": number(row.locked),
                "total": number(row.available + row.locked),
            }),
        );
    }
    Value::Object(result)
}

pub fn market(sym: &str, min_amount: Decimal) -> Value {
    let (base, quote) = symbol::split(sym).unwrap_or((sym, ""));
    json!({
        "symbol": sym,
        "id": sym,
        "base": base,
        "quote": quote,
        "active": true,
        "spot": true,
        "limits": {
            "amount": { "min": number(min_amount) },
        },
    })
}

/// OHLCV rows as CCXT arrays: `[open_time_ms, o, h, l, c, v]`.
pub fn ohlcv(rows: &[Kline]) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| {
                json!([
                    timestamp_ms(row.open_time),
                    number(row.open),
                    number(row.high),
                    number(row.low),
                    number(row.close),
                    number(row.volume),
                ])
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_ticker() -> Ticker {
        Ticker {
            symbol: "BTC/USDT".to_string(),
            last_price: dec!(50000),
            bid_price: Some(dec!(49975)),
            ask_price: Some(dec!(50025)),
            high_24h: None,
            low_24h: None,
            volume_24h_base: None,
            volume_24h_quote: None,
            price_change_24h: None,
            price_change_percent_24h: None,
            updated_at: Utc::now().naive_utc(),
            source: "hyperliquid".to_string(),
        }
    }

    #[test]
    fn ticker_shape() {
        let value = ticker(&sample_ticker());
        assert_eq!(value["symbol"], "BTC/USDT");
        assert_eq!(value["last"], json!(50000.0));
        assert_eq!(value["bid"], json!(49975.0));
        assert_eq!(value["high"], json!(0.0));
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn ticker_falls_back_to_last_for_missing_sides() {
        let mut t = sample_ticker();
        t.bid_price = None;
        t.ask_price = None;
        let value = ticker(&t);
        assert_eq!(value["bid"], json!(50000.0));
        assert_eq!(value["ask"], json!(50000.0));
    }

    #[test]
    fn order_shape() {
        let now = Utc::now().naive_utc();
        let row = Order {
            id: 12,
            user_id: 3,
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
            client_order_id: Some("client-1".to_string()),
            created_at: now,
            updated_at: now,
            filled_at: None,
            canceled_at: None,
            triggered_at: None,
        };
        let value = order(&row);
        assert_eq!(value["id"], "12");
        assert_eq!(value["clientOrderId"], "client-1");
        assert_eq!(value["type"], "limit");
        assert_eq!(value["price"], json!(49000.0));
        assert_eq!(value["remaining"], json!(0.1));
        assert_eq!(value["status"], "new");
    }

    #[test]
    fn balances_keyed_by_asset() {
        let now = Utc::now().naive_utc();
        let rows = vec![
            Balance {
                id: 1,
                user_id: 3,
                asset: "USDT".to_string(),
                available: dec!(100.5),
                locked: dec!(20),
                created_at: now,
                updated_at: now,
            },
            Balance {
                id: 2,
                user_id: 3,
                asset: "BTC".to_string(),
                available: dec!(0.5),
                locked: dec!(0),
                created_at: now,
                updated_at: now,
            },
        ];
        let value = balances(&rows);
        assert_eq!(value["USDT"]["free"], json!(100.5));
        assert_eq!(value["USDT"]["used"], json!(20.0));
        assert_eq!(value["USDT"]["total"], json!(120.5));
        assert_eq!(value["BTC"]["total"], json!(0.5));
    }

    #[test]
    fn market_shape() {
        let value = market("BTC/USDT", dec!(0.0001));
        assert_eq!(value["base"], "BTC");
        assert_eq!(value["quote"], "USDT");
        assert_eq!(value["limits"]["amount"]["min"], json!(0.0001));
    }

    #[test]
    fn ohlcv_rows_are_arrays() {
        let now = Utc::now().naive_utc();
        let rows = vec![Kline {
            id: 1,
            symbol: "BTC/USDT".to_string(),
            interval: "1m".to_string(),
            open_time: now,
            close_time: now,
            open: dec!(1),
            high: dec!(2),
            low: dec!(0.5),
            close: dec!(1.5),
            volume: dec!(10),
            created_at: now,
            updated_at: now,
        }];
        let value = ohlcv(&rows);
        let row = value[0].as_array().unwrap();
        assert_eq!(row.len(), 6);
        assert_eq!(row[1], json!(1.0));
        assert_eq!(row[5], json!(10.0));
    }
}
