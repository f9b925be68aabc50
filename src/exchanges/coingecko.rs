use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::catalog::Catalog;
use super::http::RestClient;
use super::traits::PriceSource;
use super::types::{parse_decimal, CoinDefinition, CoinInfo, Ticker};
use crate::config::ExchangeConfig;

pub const COINGECKO_API: &str = "https://api.coingecko.com/api/v3";
const NAME: &str = "CoinGecko";
const DEFAULT_DISCOVERY_SECS: u64 = 650;

/// Full-market catalog and the only source of extended coin metadata.
#[derive(Debug)]
pub struct CoinGeckoExchange {
    rest: RestClient,
    priority: i32,
    catalog: Catalog,
    discovery_interval: Duration,
}

impl CoinGeckoExchange {
    pub fn new(config: &ExchangeConfig, timeout: Duration) -> Result<Self> {
        let base_url = config.api_url.as_deref().unwrap_or(COINGECKO_API);
        Ok(Self {
            rest: RestClient::new(base_url, timeout)?,
            priority: config.priority,
            // lists every token in existence, new listings are noise
            catalog: Catalog::new(NAME, config.overrides()).with_listings(false),
            discovery_interval: Duration::from_secs(config.update_rate_secs.unwrap_or(DEFAULT_DISCOVERY_SECS)),
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoExchange {
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
        let response = self.rest.get_json("/coins/list", &[]).await?;
        parse_coin_list(&response)
    }

    async fn fetch_tickers(&self, coins: &[CoinDefinition]) -> Result<HashMap<String, Ticker>> {
        let ids = coins.iter().map(|c| c.coin_id.as_str()).collect::<Vec<_>>().join(",");
        let response = self
            .rest
            .get_json(
                "/simple/price",
                &[
                    ("ids", ids),
                    ("vs_currencies", "usd".to_string()),
                    ("include_24hr_change", "true".to_string()),
                ],
            )
            .await?;
        parse_simple_prices(&response, coins)
    }

    fn supports_info(&self) -> bool {
        true
    }

    async fn fetch_coin_info(&self, coin: &CoinDefinition) -> Result<CoinInfo> {
        let response = self
            .rest
            .get_json(
                &format!("/coins/{}", coin.coin_id),
                &[
                    ("localization", "false".to_string()),
                    ("tickers", "false".to_string()),
                ],
            )
            .await?;
        Ok(parse_coin_info(&coin.coin_id, &response))
    }
}

fn parse_coin_list(response: &Value) -> Result<Vec<CoinDefinition>> {
    let entries = response
        .as_array()
        .ok_or_else(|| anyhow!("coin list response is not a list"))?;

    let mut coins = Vec::with_capacity(entries.len());
    for entry in entries {
        let id = entry.get("id").and_then(Value::as_str);
        let symbol = entry.get("symbol").and_then(Value::as_str);
        match (id, symbol) {
            (Some(id), Some(symbol)) if !id.is_empty() && !symbol.is_empty() => {
                let name = entry.get("name").and_then(Value::as_str).map(str::to_string);
                coins.push(CoinDefinition::new(id, symbol, name));
            }
            _ => warn!(exchange = NAME, "skipping malformed catalog entry: {}", entry),
        }
    }
    Ok(coins)
}

fn parse_simple_prices(response: &Value, coins: &[CoinDefinition]) -> Result<HashMap<String, Ticker>> {
    let prices = response
        .as_object()
        .ok_or_else(|| anyhow!("price response is not an object"))?;

    let mut tickers = HashMap::new();
    for coin in coins {
        let Some(entry) = prices.get(&coin.coin_id) else {
            continue;
        };
        match Ticker::from_values(&entry["usd"], &entry["usd_24h_change"]) {
            Ok(ticker) => {
                tickers.insert(coin.symbol.clone(), ticker);
            }
            Err(e) => warn!(exchange = NAME, symbol = %coin.symbol, "unusable ticker: {}", e),
        }
    }
    Ok(tickers)
}

fn parse_coin_info(coin_id: &str, info: &Value) -> CoinInfo {
    let text = |pointer: &str| {
        info.pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let number = |pointer: &str| info.pointer(pointer).and_then(|v| parse_decimal(v).ok());

    let repos: Vec<String> = info
        .pointer("/links/repos_url")
        .and_then(Value::as_object)
        .map(|hosts| {
            hosts
                .values()
                .filter_map(Value::as_array)
                .flatten()
                .filter_map(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let ath_date = text("/market_data/ath_date/usd")
        .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
        .map(|d| d.with_timezone(&Utc));

    CoinInfo {
        name: text("/name"),
        homepage: text("/links/homepage/0"),
        reddit: text("/links/subreddit_url"),
        source_page: Some(format!("https://www.coingecko.com/en/coins/{}", coin_id)),
        total_supply: number("/market_data/total_supply"),
        circulating_supply: number("/market_data/circulating_supply"),
        market_cap: number("/market_data/market_cap/usd"),
        ath: number("/market_data/ath/usd"),
        ath_date,
        description: text("/description/en").map(|d| strip_tags(&d)),
        repos,
        algorithm: text("/hashing_algorithm"),
        block_time_minutes: number("/block_time_in_minutes"),
        image: text("/image/small"),
    }
}

/// Drops markup from CoinGecko descriptions and decodes character references.
fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    decode_entities(&text).trim().to_string()
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let decoded = rest
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    let code = match entity.strip_prefix('#') {
        Some(hex) if hex.starts_with(['x', 'X']) => u32::from_str_radix(&hex[1..], 16).ok()?,
        Some(dec) => dec.parse().ok()?,
        None => {
            return match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => None,
            }
        }
    };
    char::from_u32(code)
}
