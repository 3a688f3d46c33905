//! The market data loop: polls the external mid-price feed on a fixed
//! interval, upserts tickers and candle snapshots, then scans resting limit
//! and stop orders and dispatches the ones the new prices unlock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use database::schema::{orders, tickers};
use database::{DbPool, NewOrder, Order, OrderStatus, OrderType, Ticker};
use diesel::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::config::{DataSource, MarketConfig};
use crate::dispatch::MatchDispatcher;
use crate::error::EngineError;
use crate::feed::PriceFeed;
use crate::kline::KlineService;
use crate::symbol;

/// Synthetic half-spread applied to the provider's mid price. The feed only
/// publishes mids, so bid/ask here are a modeling convenience, not external
/// truth.
pub const HALF_SPREAD: Decimal = Decimal::from_parts(5, 0, 0, false, 4); // 0.0005

pub const TICKER_SOURCE: &str = "hyperliquid";

pub struct MarketService<F: PriceFeed> {
    pool: DbPool,
    cfg: MarketConfig,
    feed: F,
    dispatcher: Arc<MatchDispatcher>,
    klines: Arc<KlineService>,
}

impl<F: PriceFeed + 'static> MarketService<F> {
    pub fn new(
        pool: DbPool,
        cfg: MarketConfig,
        feed: F,
        dispatcher: Arc<MatchDispatcher>,
        klines: Arc<KlineService>,
    ) -> Self {
        Self {
            pool,
            cfg,
            feed,
            dispatcher,
            klines,
        }
    }

    /// Run the poll loop until the owning task is cancelled at shutdown.
    pub async fn run(self: Arc<Self>) {
        let period = self.cfg.update_interval_duration().unwrap_or_else(|| {
            warn!(
                configured = %self.cfg.update_interval,
                "invalid market update interval, falling back to 1s"
            );
            Duration::from_secs(1)
        });

        info!(
            source = ?self.cfg.data_source,
            interval = ?period,
            symbols = self.cfg.symbols.len(),
            "market data auto-update started"
        );

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(err) = self.tick().await {
                // A failed tick commits nothing; the next one starts clean.
                error!(%err, "market data update failed");
            }
        }
    }

    /// One tick: tickers, then candles, then the trigger scans.
    async fn tick(self: &Arc<Self>) -> Result<(), EngineError> {
        match self.cfg.data_source {
            DataSource::Hyperliquid => self.update_tickers().await?,
            DataSource::Binance => {
                warn!("binance data source is not implemented");
                return Ok(());
            }
        }

        // Candle snapshots ride the same tick but are independent of the
        // trigger path; run them concurrently with the scans.
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = service
                .klines
                .sync_from_feed(&service.feed, &service.cfg.symbols)
                .await
            {
                warn!(%err, "kline sync failed");
            }
        });

        self.scan_limit_orders().await;
        self.scan_stop_orders().await;
        Ok(())
    }

    async fn update_tickers(&self) -> Result<(), EngineError> {
        let mids = self.feed.poll_mids().await?;
        debug!(mids = mids.len(), "received mid prices");

        let now = Utc::now().naive_utc();
        let mut rows = Vec::with_capacity(self.cfg.symbols.len());
        for sym in &self.cfg.symbols {
            let coin = match symbol::base(sym) {
                Ok(coin) => coin,
                Err(err) => {
                    warn!(symbol = %sym, %err, "skipping configured symbol");
                    continue;
                }
            };
            let Some(raw) = mids.get(coin) else {
                debug!(symbol = %sym, coin, "coin absent from feed response");
                continue;
            };
            match raw.parse::<Decimal>() {
                Ok(price) => rows.push(build_ticker(sym, price, now)),
                Err(err) => {
                    warn!(symbol = %sym, raw, %err, "failed to parse mid price");
                }
            }
        }

        if rows.is_empty() {
            return Ok(());
        }

        let pool = self.pool.clone();
        let count = rows.len();
        tokio::task::spawn_blocking(move || upsert_tickers(&pool, &rows))
            .await
            .map_err(|err| EngineError::Feed(format!("ticker upsert task failed: {err}")))??;

        info!(count, source = TICKER_SOURCE, "tickers updated");
        Ok(())
    }

    /// Re-attempt every resting limit order, oldest first, through the
    /// bounded dispatcher.
    async fn scan_limit_orders(&self) {
        let pool = self.pool.clone();
        let loaded = tokio::task::spawn_blocking(move || -> Result<Vec<i64>, EngineError> {
            let mut conn = pool.get()?;
            Ok(orders::table
                .filter(orders::status.eq(OrderStatus::New.as_str()))
                .filter(orders::order_type.eq(OrderType::Limit.as_str()))
                .order(orders::created_at.asc())
                .select(orders::id)
                .load::<i64>(&mut conn)?)
        })
        .await;

        match loaded {
            Ok(Ok(ids)) => {
                if !ids.is_empty() {
                    debug!(count = ids.len(), "re-dispatching resting limit orders");
                }
                for id in ids {
                    self.dispatcher.dispatch(id);
                }
            }
            Ok(Err(err)) => error!(%err, "failed to query resting limit orders"),
            Err(err) => error!(%err, "limit scan task failed"),
        }
    }

    /// Check every resting stop/take order against the fresh last price and
    /// fire the ones whose condition is met.
    async fn scan_stop_orders(&self) {
        let pool = self.pool.clone();
        let loaded = tokio::task::spawn_blocking(move || -> Result<Vec<i64>, EngineError> {
            let mut conn = pool.get()?;
            Ok(orders::table
                .filter(orders::status.eq(OrderStatus::New.as_str()))
                .filter(orders::order_type.eq_any([
                    OrderType::StopLoss.as_str(),
                    OrderType::TakeProfit.as_str(),
                ]))
                .order(orders::created_at.asc())
                .select(orders::id)
                .load::<i64>(&mut conn)?)
        })
        .await;

        let ids = match loaded {
            Ok(Ok(ids)) => ids,
            Ok(Err(err)) => {
                error!(%err, "failed to query stop orders");
                return;
            }
            Err(err) => {
                error!(%err, "stop scan task failed");
                return;
            }
        };

        for id in ids {
            let pool = self.pool.clone();
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(async move {
                match tokio::task::spawn_blocking(move || check_and_trigger_stop(&pool, id)).await
                {
                    Ok(Ok(Some(child_id))) => dispatcher.dispatch(child_id),
                    Ok(Ok(None)) => {}
                    Ok(Err(err)) => warn!(order_id = id, %err, "stop trigger check failed"),
                    Err(err) => error!(order_id = id, %err, "stop trigger task failed"),
                }
            });
        }
    }
}

pub fn build_ticker(
    sym: &str,
    mid: Decimal,
    now: chrono::NaiveDateTime,
) -> Ticker {
    let (bid, ask) = synthetic_quotes(mid);
    Ticker {
        symbol: sym.to_string(),
        last_price: mid,
        bid_price: Some(bid),
        ask_price: Some(ask),
        high_24h: None,
        low_24h: None,
        volume_24h_base: None,
        volume_24h_quote: None,
        price_change_24h: None,
        price_change_percent_24h: None,
        updated_at: now,
        source: TICKER_SOURCE.to_string(),
    }
}

/// Read the committed ticker row for a symbol.
pub fn get_ticker(pool: &DbPool, sym: &str) -> Result<Ticker, EngineError> {
    let mut conn = pool.get()?;
    tickers::table
        .find(sym)
        .first::<Ticker>(&mut conn)
        .optional()?
        .ok_or_else(|| EngineError::TickerUnavailable(sym.to_string()))
}

/// Derive bid/ask around a mid price with the fixed half-spread.
pub fn synthetic_quotes(mid: Decimal) -> (Decimal, Decimal) {
    let bid = mid * (Decimal::ONE - HALF_SPREAD);
    let ask = mid * (Decimal::ONE + HALF_SPREAD);
    (bid, ask)
}

fn upsert_tickers(pool: &DbPool, rows: &[Ticker]) -> Result<(), EngineError> {
    let mut conn = pool.get()?;
    for row in rows {
        diesel::insert_into(tickers::table)
            .values(row)
            .on_conflict(tickers::symbol)
            .do_update()
            .set(row)
            .execute(&mut conn)?;
    }
    Ok(())
}

/// Fire one stop/take order if its condition is met: flip it to `triggered`
/// and insert the child market order, in one transaction. The child does
/// not freeze funds; it spends the parent's reservation. Returns the child
/// order id when the stop fired.
fn check_and_trigger_stop(pool: &DbPool, order_id: i64) -> Result<Option<i64>, EngineError> {
    let mut conn = pool.get()?;
    conn.transaction::<_, EngineError, _>(|conn| {
        let order = orders::table
            .find(order_id)
            .for_update()
            .first::<Order>(conn)
            .optional()?
            .ok_or(EngineError::NotFound("order"))?;

        // Raced with a cancel or an earlier trigger.
        if order.status_enum() != Some(OrderStatus::New) {
            return Ok(None);
        }

        let stop_price = order.stop_price.ok_or(EngineError::MissingPrice("stop"))?;
        let condition = order.trigger_condition_enum().ok_or_else(|| {
            EngineError::InvalidTriggerCondition(
                order.trigger_condition.clone().unwrap_or_default(),
            )
        })?;

        let ticker = tickers::table
            .find(&order.symbol)
            .first::<Ticker>(conn)
            .optional()?
            .ok_or_else(|| EngineError::TickerUnavailable(order.symbol.clone()))?;

        if !condition.is_met(ticker.last_price, stop_price) {
            return Ok(None);
        }

        let now = Utc::now().naive_utc();
        diesel::update(orders::table.find(order.id))
            .set((
                orders::status.eq(OrderStatus::Triggered.as_str()),
                orders::triggered_at.eq(Some(now)),
                orders::updated_at.eq(now),
            ))
            .execute(conn)?;

        let child = diesel::insert_into(orders::table)
            .values(&NewOrder {
                user_id: order.user_id,
                symbol: order.symbol.clone(),
                side: order.side.clone(),
                order_type: OrderType::Market.as_str().to_string(),
                status: OrderStatus::New.as_str().to_string(),
                price: None,
                amount: order.amount,
                stop_price: None,
                trigger_condition: None,
                parent_order_id: Some(order.id),
                reserved_amount: None,
                reserved_asset: None,
                client_order_id: None,
            })
            .get_result::<Order>(conn)?;

        info!(
            parent_order_id = order.id,
            child_order_id = child.id,
            last_price = %ticker.last_price,
            stop_price = %stop_price,
            "stop order triggered"
        );

        Ok(Some(child.id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn synthetic_quotes_straddle_the_mid() {
        let (bid, ask) = synthetic_quotes(dec!(50000));
        assert_eq!(bid, dec!(49975.0000));
        assert_eq!(ask, dec!(50025.0000));
        assert!(bid < dec!(50000) && dec!(50000) < ask);
    }

    #[test]
    fn build_ticker_shape() {
        let now = Utc::now().naive_utc();
        let ticker = build_ticker("BTC/USDT", dec!(50000), now);
        assert_eq!(ticker.symbol, "BTC/USDT");
        assert_eq!(ticker.last_price, dec!(50000));
        assert_eq!(ticker.source, "hyperliquid");
        assert!(ticker.bid_price.unwrap() < ticker.ask_price.unwrap());
        assert_eq!(ticker.high_24h, None);
    }
}
