//! OHLCV candle snapshots: upserted from the provider on the market loop's
//! cadence, read back by the OHLCV endpoint.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use database::schema::klines;
use database::{DbPool, Kline, NewKline};
use diesel::prelude::*;
use tracing::warn;

use crate::error::EngineError;
use crate::feed::{FeedCandle, PriceFeed};
use crate::symbol;

/// Supported candle intervals.
pub const INTERVALS: [&str; 6] = ["1m", "5m", "15m", "1h", "4h", "1d"];

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

/// Candle span for an interval tag.
pub fn interval_duration(interval: &str) -> Option<Duration> {
    match interval {
        "1m" => Some(Duration::minutes(1)),
        "5m" => Some(Duration::minutes(5)),
        "15m" => Some(Duration::minutes(15)),
        "1h" => Some(Duration::hours(1)),
        "4h" => Some(Duration::hours(4)),
        "1d" => Some(Duration::days(1)),
        _ => None,
    }
}

pub(crate) fn clamp_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}

pub struct KlineService {
    pool: DbPool,
}

impl KlineService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Time-ascending candles for one symbol and interval. `limit` defaults
    /// to 100 and is capped at 1000; `since` filters on open time.
    pub fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: i64,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<Kline>, EngineError> {
        let mut conn = self.pool.get()?;
        let mut query = klines::table
            .filter(klines::symbol.eq(symbol))
            .filter(klines::interval.eq(interval))
            .into_boxed();
        if let Some(since) = since {
            query = query.filter(klines::open_time.ge(since));
        }
        Ok(query
            .order(klines::open_time.asc())
            .limit(clamp_limit(limit))
            .load::<Kline>(&mut conn)?)
    }

    /// Fetch candle snapshots for every (symbol, interval) pair and upsert
    /// them. Per-pair failures are logged and skipped; this never aborts the
    /// caller's tick.
    pub async fn sync_from_feed<F: PriceFeed>(
        &self,
        feed: &F,
        symbols: &[String],
    ) -> Result<(), EngineError> {
        let start_time_ms = (Utc::now() - Duration::hours(24)).timestamp_millis();

        for sym in symbols {
            let coin = match symbol::base(sym) {
                Ok(coin) => coin,
                Err(err) => {
                    warn!(symbol = %sym, %err, "skipping candle sync for bad symbol");
                    continue;
                }
            };

            for interval in INTERVALS {
                let candles = match feed.poll_candles(coin, interval, start_time_ms).await {
                    Ok(candles) => candles,
                    Err(err) => {
                        warn!(symbol = %sym, interval, %err, "candle snapshot failed");
                        continue;
                    }
                };

                let rows = parse_candles(sym, interval, &candles);
                if rows.is_empty() {
                    continue;
                }

                let pool = self.pool.clone();
                let result =
                    tokio::task::spawn_blocking(move || upsert_klines(&pool, &rows)).await;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => {
                        warn!(symbol = %sym, interval, %err, "failed to save klines")
                    }
                    Err(err) => warn!(symbol = %sym, interval, %err, "kline upsert task failed"),
                }
            }
        }

        Ok(())
    }
}

/// Convert provider candles to rows, skipping anything that fails to parse.
pub(crate) fn parse_candles(
    sym: &str,
    interval: &str,
    candles: &[FeedCandle],
) -> Vec<NewKline> {
    candles
        .iter()
        .filter_map(|candle| match candle_to_row(sym, interval, candle) {
            Some(row) => Some(row),
            None => {
                warn!(symbol = %sym, interval, ?candle, "skipping unparseable kline");
                None
            }
        })
        .collect()
}

fn candle_to_row(sym: &str, interval: &str, candle: &FeedCandle) -> Option<NewKline> {
    let open_time = DateTime::from_timestamp_millis(candle.open_time_ms)?.naive_utc();
    let close_time = candle
        .close_time_ms
        .filter(|ms| *ms > 0)
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.naive_utc())
        .unwrap_or_else(|| {
            open_time + interval_duration(interval).unwrap_or_else(|| Duration::hours(1))
        });

    Some(NewKline {
        symbol: sym.to_string(),
        interval: interval.to_string(),
        open_time,
        close_time,
        open: candle.open.parse().ok()?,
        high: candle.high.parse().ok()?,
        low: candle.low.parse().ok()?,
        close: candle.close.parse().ok()?,
        volume: candle.volume.parse().ok()?,
    })
}

fn upsert_klines(pool: &DbPool, rows: &[NewKline]) -> Result<(), EngineError> {
    let mut conn = pool.get()?;
    let now = Utc::now().naive_utc();
    for row in rows {
        diesel::insert_into(klines::table)
            .values(row)
            .on_conflict((klines::symbol, klines::interval, klines::open_time))
            .do_update()
            .set((
                klines::close_time.eq(row.close_time),
                klines::open.eq(row.open),
                klines::high.eq(row.high),
                klines::low.eq(row.low),
                klines::close.eq(row.close),
                klines::volume.eq(row.volume),
                klines::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open_ms: i64) -> FeedCandle {
        FeedCandle {
            open_time_ms: open_ms,
            close_time_ms: Some(open_ms + 60_000),
            open: "50000.0".to_string(),
            high: "50020.0".to_string(),
            low: "49990.0".to_string(),
            close: "50010.0".to_string(),
            volume: "12.5".to_string(),
        }
    }

    #[test]
    fn limit_clamping() {
        assert_eq!(clamp_limit(0), 100);
        assert_eq!(clamp_limit(-5), 100);
        assert_eq!(clamp_limit(1), 1);
        assert_eq!(clamp_limit(250), 250);
        assert_eq!(clamp_limit(5000), 1000);
    }

    #[test]
    fn interval_durations() {
        assert_eq!(interval_duration("1m"), Some(Duration::minutes(1)));
        assert_eq!(interval_duration("4h"), Some(Duration::hours(4)));
        assert_eq!(interval_duration("1d"), Some(Duration::days(1)));
        assert_eq!(interval_duration("1w"), None);
    }

    #[test]
    fn parses_well_formed_candles() {
        let rows = parse_candles("BTC/USDT", "1m", &[candle(1_700_000_000_000)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "BTC/USDT");
        assert_eq!(rows[0].interval, "1m");
        assert_eq!(rows[0].open, dec!(50000.0));
        assert_eq!(rows[0].volume, dec!(12.5));
        assert_eq!(
            (rows[0].close_time - rows[0].open_time).num_seconds(),
            60
        );
    }

    #[test]
    fn skips_unparseable_rows_without_failing() {
        let mut bad = candle(1_700_000_000_000);
        bad.high = "not-a-price".to_string();
        let good = candle(1_700_000_060_000);

        let rows = parse_candles("BTC/USDT", "1m", &[bad, good]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].open_time.and_utc().timestamp_millis(), 1_700_000_060_000);
    }

    #[test]
    fn derives_close_time_when_absent() {
        let mut candle = candle(1_700_000_000_000);
        candle.close_time_ms = None;
        let rows = parse_candles("BTC/USDT", "5m", &[candle]);
        assert_eq!((rows[0].close_time - rows[0].open_time).num_minutes(), 5);
    }
}
