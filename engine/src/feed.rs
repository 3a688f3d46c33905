//! External mid-price providers. The venue has no book of its own; every
//! price it quotes comes from a provider's mid, so the provider is modeled
//! as a capability the market loop polls.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::EngineError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One candle snapshot row as the provider returns it. Prices stay strings
/// until the kline service parses them; a bad row is skipped, not fatal.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedCandle {
    #[serde(rename = "t")]
    pub open_time_ms: i64,
    #[serde(rename = "T", default)]
    pub close_time_ms: Option<i64>,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "v")]
    pub volume: String,
}

/// A mid-price source: a flat coin -> price map, plus candle snapshots.
pub trait PriceFeed: Send + Sync {
    fn poll_mids(
        &self,
    ) -> impl std::future::Future<Output = Result<HashMap<String, String>, EngineError>> + Send;

    fn poll_candles(
        &self,
        coin: &str,
        interval: &str,
        start_time_ms: i64,
    ) -> impl std::future::Future<Output = Result<Vec<FeedCandle>, EngineError>> + Send;
}

/// Hyperliquid info endpoint client. Both request kinds POST a typed JSON
/// body to the same URL.
pub struct HyperliquidFeed {
    client: Client,
    url: String,
}

impl HyperliquidFeed {
    pub fn new(api_url: &str, info_endpoint: &str) -> Result<Self, EngineError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: format!("{api_url}{info_endpoint}"),
        })
    }
}

impl PriceFeed for HyperliquidFeed {
    async fn poll_mids(&self) -> Result<HashMap<String, String>, EngineError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "type": "allMids" }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Feed(format!(
                "unexpected status {status} from {}",
                self.url
            )));
        }

        Ok(response.json::<HashMap<String, String>>().await?)
    }

    async fn poll_candles(
        &self,
        coin: &str,
        interval: &str,
        start_time_ms: i64,
    ) -> Result<Vec<FeedCandle>, EngineError> {
        let body = json!({
            "type": "candleSnapshot",
            "req": {
                "coin": coin,
                "interval": interval,
                "startTime": start_time_ms,
            }
        });

        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Feed(format!(
                "unexpected status {status} from {}",
                self.url
            )));
        }

        Ok(response.json::<Vec<FeedCandle>>().await?)
    }
}
