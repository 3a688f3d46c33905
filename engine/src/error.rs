use rust_decimal::Decimal;
use thiserror::Error;

/// Every failure the trading core can surface. The HTTP adapter maps these
/// onto status codes; background loops log them and keep going.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("symbol must be of the form BASE/QUOTE, got {0:?}")]
    InvalidSymbol(String),

    #[error("side must be buy or sell, got {0:?}")]
    InvalidSide(String),

    #[error("unsupported order type {0:?}")]
    InvalidOrderType(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("price is required for {0} orders")]
    MissingPrice(&'static str),

    #[error("insufficient balance: available {available} {asset}, required {required}")]
    InsufficientFunds {
        asset: String,
        available: Decimal,
        required: Decimal,
    },

    #[error("insufficient locked balance: locked {locked} {asset}, required {required}")]
    InsufficientLocked {
        asset: String,
        locked: Decimal,
        required: Decimal,
    },

    #[error("invalid trigger condition {0:?}")]
    InvalidTriggerCondition(String),

    #[error("cannot transfer to yourself")]
    InvalidRecipient,

    #[error("ticker not found for symbol {0}")]
    TickerUnavailable(String),

    #[error("{side} price not available for {symbol}")]
    PriceUnavailable { symbol: String, side: &'static str },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("invalid email address {0:?}")]
    InvalidEmail(String),

    #[error("invalid user status {0:?}, must be one of active, inactive, suspended")]
    InvalidStatus(String),

    #[error("order does not belong to user")]
    NotOwner,

    #[error("order status is {0}, expected new")]
    IllegalTransition(String),

    #[error("market data feed error: {0}")]
    Feed(String),

    #[error("database error: {0}")]
    Persistence(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Feed(err.to_string())
    }
}

impl EngineError {
    /// True for failures caused by the request rather than the venue.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            EngineError::Feed(_) | EngineError::Persistence(_) | EngineError::Pool(_)
        )
    }
}
