//! Order lifecycle: validation, fund reservation, persistence, cancellation
//! and the read-only views. Funds are frozen before the order row exists; a
//! failed insert releases the reservation with a compensating unfreeze.

use std::sync::Arc;

use chrono::Utc;
use database::schema::{orders, tickers, trades};
use database::{
    DbPool, NewOrder, Order, OrderStatus, OrderType, Side, Ticker, Trade, TriggerCondition,
};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use crate::config::TradingConfig;
use crate::dispatch::MatchDispatcher;
use crate::error::EngineError;
use crate::ledger::{self, Ledger};
use crate::market::HALF_SPREAD;
use crate::symbol;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub client_order_id: Option<String>,
}

/// A request that passed validation, with its enums parsed.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub client_order_id: Option<String>,
}

pub struct OrderService {
    pool: DbPool,
    trading: TradingConfig,
    ledger: Arc<Ledger>,
    dispatcher: Arc<MatchDispatcher>,
}

impl OrderService {
    pub fn new(
        pool: DbPool,
        trading: TradingConfig,
        ledger: Arc<Ledger>,
        dispatcher: Arc<MatchDispatcher>,
    ) -> Self {
        Self {
            pool,
            trading,
            ledger,
            dispatcher,
        }
    }

    /// Validate, reserve funds, persist and dispatch a new order.
    pub fn place_order(
        &self,
        user_id: i64,
        request: CreateOrderRequest,
    ) -> Result<Order, EngineError> {
        let validated = validate_request(&request, self.trading.min_order_amount)?;

        // Market orders price their reservation off the ask settlement will
        // deduct at; without a ticker there is nothing to reserve against,
        // so fail before any funds move.
        let reference_price = if validated.order_type == OrderType::Market {
            let mut conn = self.pool.get()?;
            let ticker = tickers::table
                .find(&validated.symbol)
                .first::<Ticker>(&mut conn)
                .optional()?
                .ok_or_else(|| EngineError::TickerUnavailable(validated.symbol.clone()))?;
            Some(ticker.ask_price.unwrap_or_else(|| {
                ticker.last_price * (Decimal::ONE + HALF_SPREAD)
            }))
        } else {
            None
        };

        let (reserved_asset, reserved_amount) =
            reservation(&validated, reference_price, self.trading.taker_fee_rate)?;

        self.ledger
            .freeze(user_id, &reserved_asset, reserved_amount)?;

        let new_order = NewOrder {
            user_id,
            symbol: validated.symbol.clone(),
            side: validated.side.as_str().to_string(),
            order_type: validated.order_type.as_str().to_string(),
            status: OrderStatus::New.as_str().to_string(),
            price: validated.price,
            amount: validated.amount,
            stop_price: validated.stop_price,
            trigger_condition: trigger_condition_for(validated.order_type, validated.side)
                .map(|c| c.as_str().to_string()),
            parent_order_id: None,
            reserved_amount: Some(reserved_amount),
            reserved_asset: Some(reserved_asset.clone()),
            client_order_id: validated.client_order_id.clone(),
        };

        let mut conn = self.pool.get()?;
        let order = match diesel::insert_into(orders::table)
            .values(&new_order)
            .get_result::<Order>(&mut conn)
        {
            Ok(order) => order,
            Err(err) => {
                // The reservation must not outlive a failed insert.
                if let Err(unfreeze_err) =
                    self.ledger.unfreeze(user_id, &reserved_asset, reserved_amount)
                {
                    error!(user_id, %unfreeze_err, "failed to release reservation after insert error");
                }
                return Err(err.into());
            }
        };

        info!(
            order_id = order.id,
            user_id,
            symbol = %order.symbol,
            side = %order.side,
            order_type = %order.order_type,
            amount = %order.amount,
            "order created"
        );

        // Stop orders rest until the trigger loop fires them.
        if matches!(validated.order_type, OrderType::Market | OrderType::Limit) {
            self.dispatcher.dispatch(order.id);
        }

        Ok(order)
    }

    /// Cancel a `new` order and release its reservation, all under the
    /// locked order row.
    pub fn cancel_order(&self, user_id: i64, order_id: i64) -> Result<Order, EngineError> {
        let mut conn = self.pool.get()?;
        let order = conn.transaction::<_, EngineError, _>(|conn| {
            let order = orders::table
                .find(order_id)
                .for_update()
                .first::<Order>(conn)
                .optional()?
                .ok_or(EngineError::NotFound("order"))?;

            authorize_cancel(&order, user_id)?;

            let refund = cancel_refund(conn, &order)?;

            let now = Utc::now().naive_utc();
            let updated = diesel::update(orders::table.find(order.id))
                .set((
                    orders::status.eq(OrderStatus::Cancelled.as_str()),
                    orders::canceled_at.eq(Some(now)),
                    orders::updated_at.eq(now),
                ))
                .get_result::<Order>(conn)?;

            if let Some((asset, amount)) = refund {
                if amount > Decimal::ZERO {
                    ledger::unfreeze_in_tx(conn, user_id, &asset, amount)?;
                }
            }

            Ok(updated)
        })?;

        info!(order_id, user_id, "order cancelled");
        Ok(order)
    }

    /// One order, visible only to its owner.
    pub fn get_order(&self, user_id: i64, order_id: i64) -> Result<Order, EngineError> {
        let mut conn = self.pool.get()?;
        let order = orders::table
            .find(order_id)
            .first::<Order>(&mut conn)
            .optional()?
            .ok_or(EngineError::NotFound("order"))?;
        check_owner(&order, user_id)?;
        Ok(order)
    }

    /// Paginated order history, newest first, with the total count.
    pub fn list_user_orders(
        &self,
        user_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<Order>, i64), EngineError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);

        let mut conn = self.pool.get()?;
        let total: i64 = orders::table
            .filter(orders::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)?;
        let rows = orders::table
            .filter(orders::user_id.eq(user_id))
            .order(orders::created_at.desc())
            .limit(page_size)
            .offset((page - 1) * page_size)
            .load::<Order>(&mut conn)?;
        Ok((rows, total))
    }

    /// Orders still in `new`, newest first.
    pub fn list_open_orders(&self, user_id: i64) -> Result<Vec<Order>, EngineError> {
        let mut conn = self.pool.get()?;
        Ok(orders::table
            .filter(orders::user_id.eq(user_id))
            .filter(orders::status.eq(OrderStatus::New.as_str()))
            .order(orders::created_at.desc())
            .load::<Order>(&mut conn)?)
    }

    /// The user's fills, newest first.
    pub fn list_user_trades(&self, user_id: i64, limit: i64) -> Result<Vec<Trade>, EngineError> {
        let mut conn = self.pool.get()?;
        Ok(trades::table
            .filter(trades::user_id.eq(user_id))
            .order(trades::created_at.desc())
            .limit(limit.clamp(1, 500))
            .load::<Trade>(&mut conn)?)
    }

    /// Most recent fills for a symbol, for the public trades endpoint.
    pub fn recent_trades(&self, symbol: &str, limit: i64) -> Result<Vec<Trade>, EngineError> {
        let mut conn = self.pool.get()?;
        Ok(trades::table
            .filter(trades::symbol.eq(symbol))
            .order(trades::created_at.desc())
            .limit(limit.clamp(1, 500))
            .load::<Trade>(&mut conn)?)
    }
}

pub fn validate_request(
    request: &CreateOrderRequest,
    min_order_amount: Decimal,
) -> Result<ValidatedRequest, EngineError> {
    let (base, quote) = symbol::split(&request.symbol)?;

    let side = Side::parse(&request.side)
        .ok_or_else(|| EngineError::InvalidSide(request.side.clone()))?;
    let order_type = OrderType::parse(&request.order_type)
        .ok_or_else(|| EngineError::InvalidOrderType(request.order_type.clone()))?;

    if request.amount <= Decimal::ZERO {
        return Err(EngineError::InvalidAmount(
            "amount must be positive".to_string(),
        ));
    }
    if request.amount < min_order_amount {
        return Err(EngineError::InvalidAmount(format!(
            "amount is too small, minimum is {min_order_amount}"
        )));
    }

    match order_type {
        OrderType::Limit => {
            let price = request.price.ok_or(EngineError::MissingPrice("limit"))?;
            if price <= Decimal::ZERO {
                return Err(EngineError::InvalidAmount(
                    "price must be positive".to_string(),
                ));
            }
        }
        OrderType::StopLoss | OrderType::TakeProfit => {
            let stop_price = request
                .stop_price
                .ok_or(EngineError::MissingPrice("stop"))?;
            if stop_price <= Decimal::ZERO {
                return Err(EngineError::InvalidAmount(
                    "stop price must be positive".to_string(),
                ));
            }
        }
        OrderType::Market => {}
    }

    Ok(ValidatedRequest {
        symbol: request.symbol.clone(),
        base: base.to_string(),
        quote: quote.to_string(),
        side,
        order_type,
        amount: request.amount,
        price: request.price,
        stop_price: request.stop_price,
        client_order_id: request.client_order_id.clone(),
    })
}

/// Which asset to freeze, and how much. Buys reserve quote priced at the
/// relevant reference price; sells reserve the base amount itself. Market
/// buys reserve against the current ask plus taker-fee headroom, the exact
/// amount settlement deducts, so the deduction never exceeds its own
/// reservation unless the price moved against the order in between.
pub fn reservation(
    validated: &ValidatedRequest,
    reference_price: Option<Decimal>,
    taker_rate: Decimal,
) -> Result<(String, Decimal), EngineError> {
    if validated.side == Side::Sell {
        return Ok((validated.base.clone(), validated.amount));
    }

    let amount = match validated.order_type {
        OrderType::Market => {
            let ask = reference_price
                .ok_or_else(|| EngineError::TickerUnavailable(validated.symbol.clone()))?;
            validated.amount * ask * (Decimal::ONE + taker_rate)
        }
        OrderType::Limit => {
            let price = validated.price.ok_or(EngineError::MissingPrice("limit"))?;
            validated.amount * price
        }
        OrderType::StopLoss | OrderType::TakeProfit => {
            let stop_price = validated
                .stop_price
                .ok_or(EngineError::MissingPrice("stop"))?;
            validated.amount * stop_price
        }
    };

    Ok((validated.quote.clone(), amount))
}

/// Orders are visible and cancellable only by their owner.
pub fn check_owner(order: &Order, user_id: i64) -> Result<(), EngineError> {
    if order.user_id != user_id {
        return Err(EngineError::NotOwner);
    }
    Ok(())
}

/// The full cancel guard: owned by the caller, and still in `new`. Runs
/// before any balance movement, so a rejected cancel mutates nothing.
pub fn authorize_cancel(order: &Order, user_id: i64) -> Result<(), EngineError> {
    check_owner(order, user_id)?;
    match order.status_enum() {
        Some(OrderStatus::New) => Ok(()),
        _ => Err(EngineError::IllegalTransition(order.status.clone())),
    }
}

/// Trigger condition derived from order type and side: a stop-loss sell
/// fires when the price falls to the stop, a stop-loss buy when it rises;
/// take-profits mirror that.
pub fn trigger_condition_for(
    order_type: OrderType,
    side: Side,
) -> Option<TriggerCondition> {
    match (order_type, side) {
        (OrderType::StopLoss, Side::Sell) => Some(TriggerCondition::LessOrEqual),
        (OrderType::StopLoss, Side::Buy) => Some(TriggerCondition::GreaterOrEqual),
        (OrderType::TakeProfit, Side::Sell) => Some(TriggerCondition::GreaterOrEqual),
        (OrderType::TakeProfit, Side::Buy) => Some(TriggerCondition::LessOrEqual),
        _ => None,
    }
}

/// What a cancel must unfreeze. Orders that froze funds carry the exact
/// reservation on the row; stop-spawned children (which inherit the
/// parent's lock) fall back to the derivation rules.
fn cancel_refund(
    conn: &mut PgConnection,
    order: &Order,
) -> Result<Option<(String, Decimal)>, EngineError> {
    if let (Some(amount), Some(asset)) = (order.reserved_amount, order.reserved_asset.clone()) {
        return Ok(Some((asset, amount)));
    }

    let last_price = tickers::table
        .find(&order.symbol)
        .first::<Ticker>(conn)
        .optional()?
        .map(|ticker| ticker.last_price);
    derive_refund(order, last_price)
}

pub fn derive_refund(
    order: &Order,
    last_price: Option<Decimal>,
) -> Result<Option<(String, Decimal)>, EngineError> {
    let (base, quote) = symbol::split(&order.symbol)?;
    let side = order
        .side_enum()
        .ok_or_else(|| EngineError::InvalidSide(order.side.clone()))?;
    let order_type = order
        .type_enum()
        .ok_or_else(|| EngineError::InvalidOrderType(order.order_type.clone()))?;

    if side == Side::Sell {
        return Ok(Some((base.to_string(), order.amount)));
    }

    let amount = match order_type {
        OrderType::Limit => order.price.map(|price| order.amount * price),
        OrderType::StopLoss | OrderType::TakeProfit => {
            order.stop_price.map(|stop| order.amount * stop)
        }
        OrderType::Market => last_price.map(|last| order.amount * last),
    };

    Ok(amount.map(|amount| (quote.to_string(), amount)))
}
