use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

use super::catalog::Catalog;
use super::http::RestClient;
use super::traits::PriceSource;
use super::types::{parse_decimal, CoinDefinition, PercentChange, Ticker};
use crate::config::ExchangeConfig;

pub const KUCOIN_API: &str = "https://api.kucoin.com";
const NAME: &str = "KuCoin";
const QUOTE: &str = "-USDT";
const ALL_TICKERS: &str = "/api/v1/market/allTickers";
const DEFAULT_DISCOVERY_SECS: u64 = 60;

#[derive(Debug)]
pub struct KuCoinExchange {
    rest: RestClient,
    priority: i32,
    catalog: Catalog,
    discovery_interval: Duration,
}

impl KuCoinExchange {
    pub fn new(config: &ExchangeConfig, timeout: Duration) -> Result<Self> {
        let base_url = config.api_url.as_deref().unwrap_or(KUCOIN_API);
        Ok(Self {
            rest: RestClient::new(base_url, timeout)?,
            priority: config.priority,
            catalog: Catalog::new(NAME, config.overrides()),
            discovery_interval: Duration::from_secs(config.update_rate_secs.unwrap_or(DEFAULT_DISCOVERY_SECS)),
        })
    }
}

#[async_trait]
impl PriceSource for KuCoinExchange {
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
        let response = self.rest.get_json(ALL_TICKERS, &[]).await?;
        parse_pairs(&response)
    }

    // allTickers already covers every pair, one call prices the whole batch
    async fn fetch_tickers(&self, coins: &[CoinDefinition]) -> Result<HashMap<String, Ticker>> {
        let response = self.rest.get_json(ALL_TICKERS, &[]).await?;
        parse_tickers(&response, coins)
    }
}

fn ticker_entries(response: &Value) -> Result<&Vec<Value>> {
    response
        .pointer("/data/ticker")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("allTickers response has no ticker list"))
}

/// Only USDT-quoted pairs are admitted; the pair name is the identifier.
fn parse_pairs(response: &Value) -> Result<Vec<CoinDefinition>> {
    let mut coins = Vec::new();
    for entry in ticker_entries(response)? {
        let Some(pair) = entry.get("symbol").and_then(Value::as_str) else {
            warn!(exchange = NAME, "skipping malformed catalog entry: {}", entry);
            continue;
        };
        let Some(base) = pair.strip_suffix(QUOTE).filter(|b| !b.is_empty()) else {
            continue;
        };
        coins.push(CoinDefinition::new(pair, base, None));
    }
    Ok(coins)
}

fn parse_tickers(response: &Value, coins: &[CoinDefinition]) -> Result<HashMap<String, Ticker>> {
    let by_pair: HashMap<&str, &Value> = ticker_entries(response)?
        .iter()
        .filter_map(|e| e.get("symbol").and_then(Value::as_str).map(|s| (s, e)))
        .collect();

    let mut tickers = HashMap::new();
    for coin in coins {
        let Some(entry) = by_pair.get(coin.coin_id.as_str()) else {
            continue;
        };
        let price = match parse_decimal(&entry["last"]) {
            Ok(price) => price,
            Err(e) => {
                warn!(exchange = NAME, symbol = %coin.symbol, "unusable ticker: {}", e);
                continue;
            }
        };
        // changeRate is a fraction, not a percentage
        let percent_change = match parse_decimal(&entry["changeRate"]) {
            Ok(rate) => PercentChange::Value((rate * Decimal::ONE_HUNDRED).round_dp(2)),
            Err(_) => PercentChange::Unavailable,
        };
        tickers.insert(coin.symbol.clone(), Ticker::new(price, percent_change));
    }
    Ok(tickers)
}
