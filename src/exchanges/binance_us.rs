use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::catalog::Catalog;
use super::http::RestClient;
use super::traits::PriceSource;
use super::types::{CoinDefinition, Ticker};
use crate::config::ExchangeConfig;

pub const BINANCE_US_API: &str = "https://api.binance.us";
const NAME: &str = "Binance US";
const QUOTE: &str = "USD";
/// Stablecoin quotes that also end in `USD`.
const EXCLUDED_QUOTES: &[&str] = &["BUSD", "TUSD"];
const TICKER_24H: &str = "/api/v3/ticker/24hr";
const DEFAULT_DISCOVERY_SECS: u64 = 60;

#[derive(Debug)]
pub struct BinanceUsExchange {
    rest: RestClient,
    priority: i32,
    catalog: Catalog,
    discovery_interval: Duration,
}

impl BinanceUsExchange {
    pub fn new(config: &ExchangeConfig, timeout: Duration) -> Result<Self> {
        let base_url = config.api_url.as_deref().unwrap_or(BINANCE_US_API);
        Ok(Self {
            rest: RestClient::new(base_url, timeout)?,
            priority: config.priority,
            catalog: Catalog::new(NAME, config.overrides()),
            discovery_interval: Duration::from_secs(config.update_rate_secs.unwrap_or(DEFAULT_DISCOVERY_SECS)),
        })
    }
}

#[async_trait]
impl PriceSource for BinanceUsExchange {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn discovery_interval(&self) -> Duration {
        self.discovery_interval
    }

    async fn fetch_catalog(&self) -> Result<Vec<CoinDefinition>> {
        let response = self.rest.get_json(TICKER_24H, &[]).await?;
        parse_markets(&response)
    }

    async fn fetch_tickers(&self, coins: &[CoinDefinition]) -> Result<HashMap<String, Ticker>> {
        let response = self
            .rest
            .get_json(TICKER_24H, &[("symbols", symbols_param(coins)?)])
            .await?;
        parse_tickers(&response, coins)
    }
}

/// Binance expects the batch as a JSON array: `["BTCUSD","ETHUSD"]`.
fn symbols_param(coins: &[CoinDefinition]) -> Result<String> {
    let ids: Vec<&str> = coins.iter().map(|c| c.coin_id.as_str()).collect();
    Ok(serde_json::to_string(&ids)?)
}

fn market_list(response: &Value) -> Result<&Vec<Value>> {
    response
        .as_array()
        .ok_or_else(|| anyhow!("24hr ticker response is not a list"))
}

fn parse_markets(response: &Value) -> Result<Vec<CoinDefinition>> {
    let mut coins = Vec::new();
    for entry in market_list(response)? {
        let Some(market) = entry.get("symbol").and_then(Value::as_str) else {
            warn!(exchange = NAME, "skipping malformed catalog entry: {}", entry);
            continue;
        };
        if EXCLUDED_QUOTES.iter().any(|quote| market.ends_with(quote)) {
            continue;
        }
        let Some(base) = market.strip_suffix(QUOTE).filter(|b| !b.is_empty()) else {
            continue;
        };
        coins.push(CoinDefinition::new(market, base, None));
    }
    Ok(coins)
}

fn parse_tickers(response: &Value, coins: &[CoinDefinition]) -> Result<HashMap<String, Ticker>> {
    let by_market: HashMap<&str, &Value> = market_list(response)?
        .iter()
        .filter_map(|e| e.get("symbol").and_then(Value::as_str).map(|s| (s, e)))
        .collect();

    let mut tickers = HashMap::new();
    for coin in coins {
        let Some(entry) = by_market.get(coin.coin_id.as_str()) else {
            continue;
        };
        match Ticker::from_values(&entry["lastPrice"], &entry["priceChangePercent"]) {
            Ok(ticker) => {
                tickers.insert(coin.symbol.clone(), ticker);
            }
            Err(e) => warn!(exchange = NAME, symbol = %coin.symbol, "unusable ticker: {}", e),
        }
    }
    Ok(tickers)
}
