//! Prices a single order against the latest ticker and, when it can
//! execute, writes the trade and settles both balance legs in one
//! transaction. There is no resting book: every fill is taker, against the
//! last observed external prices.

use chrono::Utc;
use database::schema::{orders, tickers, trades};
use database::{DbPool, NewTrade, Order, OrderStatus, OrderType, Side, Ticker};
use diesel::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::TradingConfig;
use crate::error::EngineError;
use crate::ledger;
use crate::symbol;

/// Result of one match attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Trade written, balances settled, order is `filled`.
    Filled,
    /// The order cannot execute at the current ticker; it stays `new` and
    /// the next tick will reconsider it.
    NotExecutable,
}

pub struct MatchingEngine {
    pool: DbPool,
    trading: TradingConfig,
}

impl MatchingEngine {
    pub fn new(pool: DbPool, trading: TradingConfig) -> Self {
        Self { pool, trading }
    }

    /// Attempt to fill the given order. The `status == new` guard, the
    /// trade insert, both balance legs and the status flip all happen under
    /// one transaction with the order row locked, so concurrent dispatches
    /// for the same id cannot double-fill.
    pub fn match_order(&self, order_id: i64) -> Result<MatchOutcome, EngineError> {
        let mut conn = self.pool.get()?;
        let taker_rate = self.trading.taker_fee_rate;

        let outcome = conn.transaction::<_, EngineError, _>(|conn| {
            let order = orders::table
                .find(order_id)
                .for_update()
                .first::<Order>(conn)
                .optional()?
                .ok_or(EngineError::NotFound("order"))?;

            match order.status_enum() {
                Some(OrderStatus::New) => {}
                _ => return Err(EngineError::IllegalTransition(order.status.clone())),
            }

            let side = order
                .side_enum()
                .ok_or_else(|| EngineError::InvalidSide(order.side.clone()))?;
            let order_type = order
                .type_enum()
                .ok_or_else(|| EngineError::InvalidOrderType(order.order_type.clone()))?;

            let ticker = tickers::table
                .find(&order.symbol)
                .first::<Ticker>(conn)
                .optional()?
                .ok_or_else(|| EngineError::TickerUnavailable(order.symbol.clone()))?;

            let price = match execution_price(
                side,
                order_type,
                order.price,
                ticker.bid_price,
                ticker.ask_price,
                &order.symbol,
            )? {
                Some(price) => price,
                None => {
                    debug!(
                        order_id = order.id,
                        limit_price = ?order.price,
                        bid = ?ticker.bid_price,
                        ask = ?ticker.ask_price,
                        "order cannot be matched yet"
                    );
                    return Ok(MatchOutcome::NotExecutable);
                }
            };

            let (base, quote) = symbol::split(&order.symbol)?;
            let plan = settlement_plan(side, base, quote, order.amount, price, taker_rate);

            diesel::insert_into(trades::table)
                .values(&NewTrade {
                    order_id: order.id,
                    user_id: order.user_id,
                    symbol: order.symbol.clone(),
                    side: order.side.clone(),
                    price: plan.price,
                    amount: order.amount,
                    quote_amount: plan.quote_amount,
                    fee: plan.fee,
                    fee_asset: Some(base.to_string()),
                    is_maker: false,
                })
                .execute(conn)?;

            settle(conn, order.user_id, &plan)?;

            let now = Utc::now().naive_utc();
            diesel::update(orders::table.find(order.id))
                .set((
                    orders::filled.eq(order.amount),
                    orders::status.eq(OrderStatus::Filled.as_str()),
                    orders::average_price.eq(Some(plan.price)),
                    orders::fee.eq(plan.fee),
                    orders::fee_asset.eq(Some(base.to_string())),
                    orders::filled_at.eq(Some(now)),
                    orders::updated_at.eq(now),
                ))
                .execute(conn)?;

            Ok(MatchOutcome::Filled)
        })?;

        if outcome == MatchOutcome::Filled {
            info!(order_id, "order matched");
        }
        Ok(outcome)
    }
}

/// Execution price for an order against the given book sides, or `None`
/// when a limit order's condition is not met yet.
pub fn execution_price(
    side: Side,
    order_type: OrderType,
    limit_price: Option<Decimal>,
    bid: Option<Decimal>,
    ask: Option<Decimal>,
    symbol: &str,
) -> Result<Option<Decimal>, EngineError> {
    match order_type {
        OrderType::Market => match side {
            Side::Buy => ask
                .map(Some)
                .ok_or_else(|| EngineError::PriceUnavailable {
                    symbol: symbol.to_string(),
                    side: "ask",
                }),
            Side::Sell => bid
                .map(Some)
                .ok_or_else(|| EngineError::PriceUnavailable {
                    symbol: symbol.to_string(),
                    side: "bid",
                }),
        },
        OrderType::Limit => {
            let limit = limit_price.ok_or(EngineError::MissingPrice("limit"))?;
            // Fills happen at the market price, not the limit price.
            Ok(match side {
                Side::Buy => ask.filter(|ask| limit >= *ask),
                Side::Sell => bid.filter(|bid| limit <= *bid),
            })
        }
        OrderType::StopLoss | OrderType::TakeProfit => {
            // Stop orders never reach the matcher; the trigger loop spawns a
            // child market order instead.
            Err(EngineError::InvalidOrderType(order_type.as_str().to_string()))
        }
    }
}

/// Everything a fill moves, computed up front so the transactional part is
/// pure bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub price: Decimal,
    pub quote_amount: Decimal,
    /// Fee, denominated in the base asset.
    pub fee: Decimal,
    pub deduct_asset: String,
    pub deduct_amount: Decimal,
    pub credit_asset: String,
    pub credit_amount: Decimal,
}

pub fn settlement_plan(
    side: Side,
    base: &str,
    quote: &str,
    amount: Decimal,
    price: Decimal,
    taker_rate: Decimal,
) -> SettlementPlan {
    let fee = amount * taker_rate;
    let quote_amount = amount * price;

    match side {
        Side::Buy => SettlementPlan {
            price,
            quote_amount,
            fee,
            deduct_asset: quote.to_string(),
            deduct_amount: quote_amount * (Decimal::ONE + taker_rate),
            credit_asset: base.to_string(),
            credit_amount: amount - fee,
        },
        Side::Sell => SettlementPlan {
            price,
            quote_amount,
            fee,
            deduct_asset: base.to_string(),
            deduct_amount: amount,
            credit_asset: quote.to_string(),
            credit_amount: quote_amount * (Decimal::ONE - taker_rate),
        },
    }
}

/// Apply a settlement plan to the user's two balance rows. Rows are locked
/// in ascending asset order; a deduction the locked funds cannot cover fails
/// with `InsufficientLocked` and rolls the whole match back.
fn settle(
    conn: &mut PgConnection,
    user_id: i64,
    plan: &SettlementPlan,
) -> Result<(), EngineError> {
    // The credit side may not have a row yet (first acquisition of an
    // asset); create it before locking so lock order stays deterministic.
    ledger::ensure_balance_row(conn, user_id, &plan.credit_asset)?;

    let (first, second) = if plan.deduct_asset <= plan.credit_asset {
        (plan.deduct_asset.as_str(), plan.credit_asset.as_str())
    } else {
        (plan.credit_asset.as_str(), plan.deduct_asset.as_str())
    };
    let first_balance = ledger::lock_balance(conn, user_id, first)?;
    let second_balance = ledger::lock_balance(conn, user_id, second)?;

    let (mut deduct_balance, mut credit_balance) = if first == plan.deduct_asset {
        (first_balance, second_balance)
    } else {
        (second_balance, first_balance)
    };

    ledger::apply_deduct(&mut deduct_balance, plan.deduct_amount)?;
    credit_balance.available += plan.credit_amount;

    ledger::save_amounts(conn, &deduct_balance)?;
    ledger::save_amounts(conn, &credit_balance)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn market_buy_takes_the_ask() {
        let price = execution_price(
            Side::Buy,
            OrderType::Market,
            None,
            Some(dec!(49990)),
            Some(dec!(50010)),
            "BTC/USDT",
        )
        .unwrap();
        assert_eq!(price, Some(dec!(50010)));
    }

    #[test]
    fn market_sell_takes_the_bid() {
        let price = execution_price(
            Side::Sell,
            OrderType::Market,
            None,
            Some(dec!(49990)),
            Some(dec!(50010)),
            "BTC/USDT",
        )
        .unwrap();
        assert_eq!(price, Some(dec!(49990)));
    }

    #[test]
    fn market_order_without_book_side_fails() {
        let err = execution_price(
            Side::Sell,
            OrderType::Market,
            None,
            None,
            Some(dec!(50010)),
            "BTC/USDT",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::PriceUnavailable { side: "bid", .. }
        ));
    }

    #[test]
    fn limit_buy_below_ask_stays_resting() {
        let price = execution_price(
            Side::Buy,
            OrderType::Limit,
            Some(dec!(49000)),
            Some(dec!(49990)),
            Some(dec!(50010)),
            "BTC/USDT",
        )
        .unwrap();
        assert_eq!(price, None);
    }

    #[test]
    fn limit_buy_crossing_fills_at_ask() {
        let price = execution_price(
            Side::Buy,
            OrderType::Limit,
            Some(dec!(50010)),
            Some(dec!(49990)),
            Some(dec!(50010)),
            "BTC/USDT",
        )
        .unwrap();
        assert_eq!(price, Some(dec!(50010)));

        // Crossing above the ask still fills at the ask, not the limit.
        let price = execution_price(
            Side::Buy,
            OrderType::Limit,
            Some(dec!(51000)),
            Some(dec!(49990)),
            Some(dec!(50010)),
            "BTC/USDT",
        )
        .unwrap();
        assert_eq!(price, Some(dec!(50010)));
    }

    #[test]
    fn limit_sell_crossing_fills_at_bid() {
        let price = execution_price(
            Side::Sell,
            OrderType::Limit,
            Some(dec!(49000)),
            Some(dec!(49990)),
            Some(dec!(50010)),
            "BTC/USDT",
        )
        .unwrap();
        assert_eq!(price, Some(dec!(49990)));
    }

    #[test]
    fn limit_with_missing_book_side_rests() {
        let price = execution_price(
            Side::Buy,
            OrderType::Limit,
            Some(dec!(50000)),
            Some(dec!(49990)),
            None,
            "BTC/USDT",
        )
        .unwrap();
        assert_eq!(price, None);
    }

    #[test]
    fn buy_settlement_includes_fee_headroom() {
        // Fee rate 0.001, 0.1 BTC at 50010: deduct 5006.001 quote,
        // credit 0.0999 base.
        let plan = settlement_plan(
            Side::Buy,
            "BTC",
            "USDT",
            dec!(0.1),
            dec!(50010),
            dec!(0.001),
        );
        assert_eq!(plan.deduct_asset, "USDT");
        assert_eq!(plan.deduct_amount, dec!(5006.001));
        assert_eq!(plan.credit_asset, "BTC");
        assert_eq!(plan.credit_amount, dec!(0.0999));
        assert_eq!(plan.fee, dec!(0.0001));
        assert_eq!(plan.quote_amount, dec!(5001.0));
    }

    #[test]
    fn sell_settlement_nets_the_fee_from_quote() {
        // 0.5 BTC at 47500: deduct 0.5 base, credit 23726.25 quote.
        let plan = settlement_plan(
            Side::Sell,
            "BTC",
            "USDT",
            dec!(0.5),
            dec!(47500),
            dec!(0.001),
        );
        assert_eq!(plan.deduct_asset, "BTC");
        assert_eq!(plan.deduct_amount, dec!(0.5));
        assert_eq!(plan.credit_asset, "USDT");
        assert_eq!(plan.credit_amount, dec!(23726.25));
        assert_eq!(plan.fee, dec!(0.0005));
    }
}
