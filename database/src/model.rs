use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// User model for inserting
#[derive(diesel::Insertable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub api_key: String,
    pub api_secret: String,
    pub role: String,
    pub status: String,
}

// User model for querying
#[derive(Debug, Clone, diesel::Queryable, diesel::Selectable, Serialize)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
    pub role: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            "suspended" => Some(UserStatus::Suspended),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl User {
    pub fn status_enum(&self) -> Option<UserStatus> {
        UserStatus::parse(&self.status)
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

// Balance models
#[derive(diesel::Insertable)]
#[diesel(table_name = crate::schema::balances)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewBalance {
    pub user_id: i64,
    pub asset: String,
    pub available: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Clone, diesel::Queryable, diesel::Selectable, Serialize)]
#[diesel(table_name = crate::schema::balances)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Balance {
    pub id: i64,
    pub user_id: i64,
    pub asset: String,
    pub available: Decimal,
    pub locked: Decimal,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    TakeProfit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::StopLoss => "stop_loss",
            OrderType::TakeProfit => "take_profit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "market" => Some(OrderType::Market),
            "limit" => Some(OrderType::Limit),
            "stop_loss" => Some(OrderType::StopLoss),
            "take_profit" => Some(OrderType::TakeProfit),
            _ => None,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, OrderType::StopLoss | OrderType::TakeProfit)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    New,
    Filled,
    Cancelled,
    Triggered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Triggered => "triggered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(OrderStatus::New),
            "filled" => Some(OrderStatus::Filled),
            "cancelled" => Some(OrderStatus::Cancelled),
            "triggered" => Some(OrderStatus::Triggered),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::New)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerCondition {
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl TriggerCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCondition::GreaterOrEqual => ">=",
            TriggerCondition::LessOrEqual => "<=",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            ">=" => Some(TriggerCondition::GreaterOrEqual),
            "<=" => Some(TriggerCondition::LessOrEqual),
            _ => None,
        }
    }

    /// Whether the condition fires against the given last price.
    pub fn is_met(&self, last_price: Decimal, stop_price: Decimal) -> bool {
        match self {
            TriggerCondition::GreaterOrEqual => last_price >= stop_price,
            TriggerCondition::LessOrEqual => last_price <= stop_price,
        }
    }
}

impl std::fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Order models
#[derive(diesel::Insertable)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewOrder {
    pub user_id: i64,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub status: String,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub stop_price: Option<Decimal>,
    pub trigger_condition: Option<String>,
    pub parent_order_id: Option<i64>,
    pub reserved_amount: Option<Decimal>,
    pub reserved_asset: Option<String>,
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, diesel::Queryable, diesel::Selectable, Serialize)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub status: String,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub filled: Decimal,
    pub average_price: Option<Decimal>,
    pub fee: Decimal,
    pub fee_asset: Option<String>,
    pub stop_price: Option<Decimal>,
    pub trigger_condition: Option<String>,
    pub parent_order_id: Option<i64>,
    pub reserved_amount: Option<Decimal>,
    pub reserved_asset: Option<String>,
    pub client_order_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub filled_at: Option<NaiveDateTime>,
    pub canceled_at: Option<NaiveDateTime>,
    pub triggered_at: Option<NaiveDateTime>,
}

impl Order {
    pub fn side_enum(&self) -> Option<Side> {
        Side::parse(&self.side)
    }

    pub fn type_enum(&self) -> Option<OrderType> {
        OrderType::parse(&self.order_type)
    }

    pub fn status_enum(&self) -> Option<OrderStatus> {
        OrderStatus::parse(&self.status)
    }

    pub fn trigger_condition_enum(&self) -> Option<TriggerCondition> {
        self.trigger_condition
            .as_deref()
            .and_then(TriggerCondition::parse)
    }

    pub fn remaining(&self) -> Decimal {
        self.amount - self.filled
    }
}

// Trade models
#[derive(diesel::Insertable)]
#[diesel(table_name = crate::schema::trades)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewTrade {
    pub order_id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub side: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub quote_amount: Decimal,
    pub fee: Decimal,
    pub fee_asset: Option<String>,
    pub is_maker: bool,
}

#[derive(Debug, Clone, diesel::Queryable, diesel::Selectable, Serialize)]
#[diesel(table_name = crate::schema::trades)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Trade {
    pub id: i64,
    pub order_id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub side: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub quote_amount: Decimal,
    pub fee: Decimal,
    pub fee_asset: Option<String>,
    pub is_maker: bool,
    pub created_at: NaiveDateTime,
}

// Ticker is written wholesale on every poll, so one struct serves insert,
// query and the upsert changeset. None must overwrite stale values.
#[derive(
    Debug,
    Clone,
    diesel::Insertable,
    diesel::Queryable,
    diesel::Selectable,
    diesel::AsChangeset,
    Serialize,
)]
#[diesel(table_name = crate::schema::tickers)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Ticker {
    pub symbol: String,
    pub last_price: Decimal,
    pub bid_price: Option<Decimal>,
    pub ask_price: Option<Decimal>,
    pub high_24h: Option<Decimal>,
    pub low_24h: Option<Decimal>,
    pub volume_24h_base: Option<Decimal>,
    pub volume_24h_quote: Option<Decimal>,
    pub price_change_24h: Option<Decimal>,
    pub price_change_percent_24h: Option<Decimal>,
    pub updated_at: NaiveDateTime,
    pub source: String,
}

// Kline models
#[derive(diesel::Insertable)]
#[diesel(table_name = crate::schema::klines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewKline {
    pub symbol: String,
    pub interval: String,
    pub open_time: NaiveDateTime,
    pub close_time: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, diesel::Queryable, diesel::Selectable, Serialize)]
#[diesel(table_name = crate::schema::klines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Kline {
    pub id: i64,
    pub symbol: String,
    pub interval: String,
    pub open_time: NaiveDateTime,
    pub close_time: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_enums_round_trip() {
        for side in [Side::Buy, Side::Sell] {
            assert_eq!(Side::parse(side.as_str()), Some(side));
        }
        for ty in [
            OrderType::Market,
            OrderType::Limit,
            OrderType::StopLoss,
            OrderType::TakeProfit,
        ] {
            assert_eq!(OrderType::parse(ty.as_str()), Some(ty));
        }
        for status in [
            OrderStatus::New,
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Triggered,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(Side::parse("BUY"), None);
        assert_eq!(OrderType::parse("stop"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Triggered.is_terminal());
    }

    #[test]
    fn trigger_condition_comparisons() {
        let ge = TriggerCondition::GreaterOrEqual;
        let le = TriggerCondition::LessOrEqual;

        assert!(ge.is_met(dec!(48000), dec!(48000)));
        assert!(ge.is_met(dec!(48001), dec!(48000)));
        assert!(!ge.is_met(dec!(47999), dec!(48000)));

        assert!(le.is_met(dec!(47500), dec!(48000)));
        assert!(le.is_met(dec!(48000), dec!(48000)));
        assert!(!le.is_met(dec!(48001), dec!(48000)));
    }

    #[test]
    fn trigger_condition_parse() {
        assert_eq!(
            TriggerCondition::parse(">="),
            Some(TriggerCondition::GreaterOrEqual)
        );
        assert_eq!(
            TriggerCondition::parse("<="),
            Some(TriggerCondition::LessOrEqual)
        );
        assert_eq!(TriggerCondition::parse(">"), None);
    }
}
