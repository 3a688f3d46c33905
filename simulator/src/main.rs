// simulator/src/main.rs
//
// Random order-flow generator against a running venue. Provisions a trader
// through the admin API, credits its balances, then streams market and limit
// orders (with the occasional cancel) until stopped.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use uuid::Uuid;

const SYMBOL_WIRE: &str = "BTC-USDT";
const QUOTE_DEPOSIT: f64 = 1_000_000.0;
const BASE_DEPOSIT: f64 = 20.0;

#[derive(Debug, Deserialize)]
struct CreatedUser {
    id: i64,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Deserialize)]
struct TickerResp {
    last: f64,
}

#[derive(Debug, Deserialize)]
struct OrderResp {
    id: String,
    status: String,
}

struct Sim {
    client: Client,
    api: String,
    admin_key: String,
    admin_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let api = std::env::var("API_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".into());
    let admin_key = std::env::var("ADMIN_API_KEY")
        .map_err(|_| anyhow::anyhow!("ADMIN_API_KEY must be set"))?;
    let admin_secret = std::env::var("ADMIN_API_SECRET")
        .map_err(|_| anyhow::anyhow!("ADMIN_API_SECRET must be set"))?;
    let order_rate_ms: u64 = std::env::var("ORDER_RATE_MS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(500);

    let sim = Sim {
        client: Client::builder().timeout(Duration::from_secs(10)).build()?,
        api,
        admin_key,
        admin_secret,
    };

    let trader = sim.provision_trader().await?;
    println!(
        "simulator trader ready: user_id={} api_key={}...",
        trader.id,
        &trader.api_key[..8]
    );

    let mut rng = StdRng::from_entropy();
    let mut open_orders: Vec<String> = Vec::new();

    loop {
        if let Err(e) = sim.step(&trader, &mut rng, &mut open_orders).await {
            eprintln!("sim step failed: {e:#}");
        }
        sleep(Duration::from_millis(order_rate_ms)).await;
    }
}

impl Sim {
    async fn provision_trader(&self) -> anyhow::Result<CreatedUser> {
        let email = format!("sim-{}@quickspot.test", Uuid::new_v4().simple());
        let resp = self
            .client
            .post(format!("{}/v1/admin/users", self.api))
            .header("X-API-Key", &self.admin_key)
            .header("X-API-Secret", &self.admin_secret)
            .json(&json!({ "email": email }))
            .send()
            .await?;
        anyhow::ensure!(
            resp.status() == StatusCode::CREATED,
            "user creation failed: {}",
            resp.status()
        );
        let user: CreatedUser = resp.json().await?;

        for (asset, amount) in [("USDT", QUOTE_DEPOSIT), ("BTC", BASE_DEPOSIT)] {
            let resp = self
                .client
                .post(format!(
                    "{}/v1/admin/users/{}/balance/adjust",
                    self.api, user.id
                ))
                .header("X-API-Key", &self.admin_key)
                .header("X-API-Secret", &self.admin_secret)
                .json(&json!({
                    "asset": asset,
                    "amount": amount,
                    "operation": "add",
                    "note": "simulator seed deposit",
                }))
                .send()
                .await?;
            anyhow::ensure!(
                resp.status().is_success(),
                "deposit of {asset} failed: {}",
                resp.status()
            );
        }

        Ok(user)
    }

    async fn step(
        &self,
        trader: &CreatedUser,
        rng: &mut StdRng,
        open_orders: &mut Vec<String>,
    ) -> anyhow::Result<()> {
        // One in five steps cancels something we left resting.
        if !open_orders.is_empty() && rng.gen_ratio(1, 5) {
            let id = open_orders.swap_remove(rng.gen_range(0..open_orders.len()));
            let resp = self
                .client
                .delete(format!("{}/v1/order/{}", self.api, id))
                .header("X-API-Key", &trader.api_key)
                .header("X-API-Secret", &trader.api_secret)
                .send()
                .await?;
            println!("cancel {id}: {}", resp.status());
            return Ok(());
        }

        let ticker: TickerResp = self
            .client
            .get(format!("{}/v1/ticker/{}", self.api, SYMBOL_WIRE))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let side = if rng.gen_bool(0.5) { "buy" } else { "sell" };
        let amount = rng.gen_range(0.001..0.05);
        let is_market = rng.gen_bool(0.3);

        let body = if is_market {
            json!({
                "symbol": SYMBOL_WIRE,
                "side": side,
                "type": "market",
                "amount": amount,
            })
        } else {
            // Limit price a few ticks away from the mid so some orders rest.
            let offset = rng.gen_range(-0.004..0.004);
            let price = ticker.last * (1.0 + offset);
            json!({
                "symbol": SYMBOL_WIRE,
                "side": side,
                "type": "limit",
                "amount": amount,
                "price": price,
                "client_order_id": Uuid::new_v4().to_string(),
            })
        };

        let resp = self
            .client
            .post(format!("{}/v1/order", self.api))
            .header("X-API-Key", &trader.api_key)
            .header("X-API-Secret", &trader.api_secret)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let order: OrderResp = resp.json().await?;
            println!(
                "{side} {} {amount:.4} BTC -> order {} ({})",
                if is_market { "market" } else { "limit" },
                order.id,
                order.status
            );
            if order.status == "new" {
                open_orders.push(order.id);
            }
        } else {
            println!("order rejected: {} {}", status, resp.text().await?);
        }

        Ok(())
    }
}
