use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use database::PoolSettings;
use engine::config::{AppConfig, LoggingConfig};
use engine::{
    HyperliquidFeed, KlineService, Ledger, MarketService, MatchDispatcher, MatchingEngine,
    OrderService, UserService,
};

pub mod auth;
pub mod ccxt;
pub mod error;
pub mod routes;
pub mod state;

use routes::admin::{
    adjust_balance, create_user, delete_user, get_user, get_user_balances, list_balances,
    list_users, update_user,
};
use routes::balance::get_balances;
use routes::market::{get_markets, get_ohlcv, get_ticker, get_trades, ping, server_time};
use routes::order::{cancel_order, create_order, get_open_orders, get_order, get_orders};
use routes::trade::get_my_trades;
use state::AppState;

const SHUTDOWN_TIMEOUT_S: u64 = 10;

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Arc::new(AppConfig::load().context("failed to load configuration")?);
    init_tracing(&cfg.logging)?;

    info!(mode = %cfg.server.mode, port = cfg.server.port, "starting venue backend");

    let pool = database::connect(
        &cfg.database.url(),
        &PoolSettings {
            max_open: cfg.database.max_open_conns,
            min_idle: cfg.database.max_idle_conns,
            max_lifetime: Duration::from_secs(cfg.database.conn_max_lifetime_s),
        },
    )
    .context("failed to connect to database")?;

    {
        let mut conn = pool.get()?;
        database::run_migrations(&mut conn)
            .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
    }

    let matching = Arc::new(MatchingEngine::new(pool.clone(), cfg.trading.clone()));
    let dispatcher = Arc::new(MatchDispatcher::new(
        matching,
        tokio::runtime::Handle::current(),
    ));
    let ledger = Arc::new(Ledger::new(pool.clone()));
    let orders = Arc::new(OrderService::new(
        pool.clone(),
        cfg.trading.clone(),
        Arc::clone(&ledger),
        Arc::clone(&dispatcher),
    ));
    let klines = Arc::new(KlineService::new(pool.clone()));
    let users = Arc::new(UserService::new(pool.clone()));

    let feed = HyperliquidFeed::new(
        &cfg.market.api_url,
        &cfg.market.hyperliquid.info_endpoint,
    )?;
    let market = Arc::new(MarketService::new(
        pool.clone(),
        cfg.market.clone(),
        feed,
        Arc::clone(&dispatcher),
        Arc::clone(&klines),
    ));
    let feed_task = tokio::spawn(market.run());

    let app_state = web::Data::new(AppState {
        pool,
        cfg: Arc::clone(&cfg),
        ledger,
        orders,
        klines,
        users,
    });

    let debug_mode = cfg.server.mode == "debug";
    let bind_addr = ("0.0.0.0", cfg.server.port);
    info!(port = cfg.server.port, "server starting");

    let server = HttpServer::new(move || {
        let app = App::new()
            .app_data(app_state.clone())
            .wrap(Cors::permissive())
            .service(health)
            .service(
                web::scope("/v1")
                    // public
                    .service(ping)
                    .service(server_time)
                    .service(get_markets)
                    .service(get_ticker)
                    .service(get_trades)
                    .service(get_ohlcv)
                    // authenticated (API-key extractor)
                    .service(get_balances)
                    .service(create_order)
                    .service(get_open_orders)
                    .service(get_orders)
                    .service(get_order)
                    .service(cancel_order)
                    .service(get_my_trades)
                    // admin
                    .service(
                        web::scope("/admin")
                            .service(create_user)
                            .service(list_users)
                            .service(get_user_balances)
                            .service(get_user)
                            .service(update_user)
                            .service(delete_user)
                            .service(list_balances)
                            .service(adjust_balance),
                    ),
            );
        if debug_mode {
            app.wrap(Logger::default())
        } else {
            app.wrap(Logger::new("%s %r %Dms").log_target("api::access"))
        }
    })
    .bind(bind_addr)?
    .shutdown_timeout(SHUTDOWN_TIMEOUT_S)
    .run();

    let result = server.await;

    // The HTTP server has drained; stop the market loop at its next await.
    feed_task.abort();
    info!("server exited");

    result.map_err(Into::into)
}

fn init_tracing(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));
    match cfg.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to install subscriber: {err}"))?,
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to install subscriber: {err}"))?,
    }
    Ok(())
}
