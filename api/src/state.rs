use std::sync::Arc;

use database::DbPool;
use engine::config::AppConfig;
use engine::{KlineService, Ledger, OrderService, UserService};

/// Shared handles the request handlers pull from.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub cfg: Arc<AppConfig>,
    pub ledger: Arc<Ledger>,
    pub orders: Arc<OrderService>,
    pub klines: Arc<KlineService>,
    pub users: Arc<UserService>,
}
