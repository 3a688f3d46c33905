//! Trading core for the simulated spot venue: balance custody, order
//! lifecycle, ticker-driven matching, the market feed loop, candle
//! aggregation and user provisioning. The HTTP adapter in the `api` crate
//! is a thin shell over these services.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod kline;
pub mod ledger;
pub mod market;
pub mod matching;
pub mod orders;
pub mod symbol;
pub mod users;

pub use config::{AppConfig, DataSource};
pub use dispatch::{MatchDispatcher, MAX_CONCURRENT_MATCHES};
pub use error::EngineError;
pub use feed::{HyperliquidFeed, PriceFeed};
pub use kline::KlineService;
pub use ledger::Ledger;
pub use market::MarketService;
pub use matching::{MatchOutcome, MatchingEngine};
pub use orders::{CreateOrderRequest, OrderService};
pub use users::{CreateUserRequest, UserService};
