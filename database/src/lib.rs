pub mod model;
pub mod schema;

use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub use model::{
    Balance, Kline, NewBalance, NewKline, NewOrder, NewTrade, NewUser, Order, OrderStatus,
    OrderType, Side, Ticker, Trade, TriggerCondition, User, UserStatus,
};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Connection pool settings, filled in from the application configuration.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_open: u32,
    pub min_idle: u32,
    pub max_lifetime: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_open: 20,
            min_idle: 5,
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// Build an r2d2 pool against the given Postgres URL.
pub fn connect(database_url: &str, settings: &PoolSettings) -> Result<DbPool, PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(settings.max_open)
        .min_idle(Some(settings.min_idle.min(settings.max_open)))
        .max_lifetime(Some(settings.max_lifetime))
        .build(manager)
}

/// Run all embedded migrations. Invoked once at startup.
pub fn run_migrations(
    conn: &mut PgConnection,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}
