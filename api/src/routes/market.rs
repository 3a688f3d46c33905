use actix_web::{get, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use engine::symbol;

use crate::ccxt;
use crate::error::ApiError;
use crate::state::AppState;

// GET /ping
#[get("/ping")]
pub async fn ping() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
    }))
}

// GET /time
#[get("/time")]
pub async fn server_time() -> impl Responder {
    let now = Utc::now();
    HttpResponse::Ok().json(json!({
        "timestamp": now.timestamp(),
        "datetime": now.to_rfc3339(),
    }))
}

// GET /markets - the configured trading pairs
#[get("/markets")]
pub async fn get_markets(state: web::Data<AppState>) -> impl Responder {
    let min_amount = state.cfg.trading.min_order_amount;
    let markets: Vec<Value> = state
        .cfg
        .market
        .symbols
        .iter()
        .map(|sym| ccxt::market(sym, min_amount))
        .collect();
    HttpResponse::Ok().json(markets)
}

// GET /ticker/{symbol} - wire form BTC-USDT
#[get("/ticker/{symbol}")]
pub async fn get_ticker(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let sym = symbol::from_wire(&path.into_inner());
    let pool = state.pool.clone();
    let ticker = web::block(move || engine::market::get_ticker(&pool, &sym)).await??;
    Ok(HttpResponse::Ok().json(ccxt::ticker(&ticker)))
}

const RECENT_TRADES_LIMIT: i64 = 50;

// GET /trades/{symbol} - most recent fills on the venue
#[get("/trades/{symbol}")]
pub async fn get_trades(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let sym = symbol::from_wire(&path.into_inner());
    let orders = state.orders.clone();
    let rows = web::block(move || orders.recent_trades(&sym, RECENT_TRADES_LIMIT)).await??;
    let body: Vec<Value> = rows.iter().map(ccxt::trade).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Deserialize)]
pub struct OhlcvQuery {
    pub timeframe: Option<String>,
    pub limit: Option<i64>,
    /// Unix milliseconds; filters candles with open_time >= since.
    pub since: Option<i64>,
}

// GET /ohlcv/{symbol}?timeframe=1h&limit=100&since=...
#[get("/ohlcv/{symbol}")]
pub async fn get_ohlcv(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<OhlcvQuery>,
) -> Result<HttpResponse, ApiError> {
    let sym = symbol::from_wire(&path.into_inner());
    let interval = query.timeframe.clone().unwrap_or_else(|| "1h".to_string());
    let limit = query.limit.unwrap_or(0);
    let since = query
        .since
        .and_then(DateTime::from_timestamp_millis)
        .map(|at| at.naive_utc());

    let klines = state.klines.clone();
    let rows = web::block(move || klines.get_klines(&sym, &interval, limit, since)).await??;
    Ok(HttpResponse::Ok().json(ccxt::ohlcv(&rows)))
}
