use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};

const DEFAULT_UPDATE_RATE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    #[serde(alias = "CoinGecko")]
    Coingecko,
    #[serde(alias = "KuCoin")]
    Kucoin,
    #[serde(alias = "Binance US")]
    BinanceUs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: ExchangeKind,
    pub priority: i32,
    #[serde(default)]
    pub api_url: Option<String>,
    /// Seconds between discovery passes. Falls back to the exchange default.
    #[serde(default)]
    pub update_rate_secs: Option<u64>,
    #[serde(default)]
    pub coin_overrides: HashMap<String, String>,
}

impl ExchangeConfig {
    pub fn new(name: ExchangeKind, priority: i32) -> Self {
        Self {
            name,
            priority,
            api_url: None,
            update_rate_secs: None,
            coin_overrides: HashMap::new(),
        }
    }

    /// Override table keyed by lowercased symbol.
    pub fn overrides(&self) -> HashMap<String, String> {
        self.coin_overrides
            .iter()
            .map(|(symbol, id)| (symbol.to_lowercase(), id.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub update_rate_secs: f64,
    pub request_timeout_ms: u64,
    pub exchanges: Vec<ExchangeConfig>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            update_rate_secs: DEFAULT_UPDATE_RATE.as_secs_f64(),
            request_timeout_ms: 5000,
            exchanges: vec![ExchangeConfig::new(ExchangeKind::Coingecko, 1)],
        }
    }
}

impl IndexerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchanges.is_empty() {
            return Err(IndexerError::Config("at least one exchange must be configured".into()));
        }
        if !(self.update_rate_secs > 0.0) {
            return Err(IndexerError::Config(format!(
                "update_rate_secs must be positive, got {}",
                self.update_rate_secs
            )));
        }
        Duration::try_from_secs_f64(self.update_rate_secs).map_err(|e| {
            IndexerError::Config(format!("update_rate_secs {} is out of range: {}", self.update_rate_secs, e))
        })?;
        if self.request_timeout_ms == 0 {
            return Err(IndexerError::Config("request_timeout_ms must be positive".into()));
        }
        for exchange in &self.exchanges {
            if exchange.update_rate_secs == Some(0) {
                return Err(IndexerError::Config(format!(
                    "{:?}: update_rate_secs must be positive",
                    exchange.name
                )));
            }
            if let Some(api_url) = &exchange.api_url {
                url::Url::parse(api_url).map_err(|e| {
                    IndexerError::Config(format!("{:?}: invalid api_url {}: {}", exchange.name, api_url, e))
                })?;
            }
        }
        Ok(())
    }

    /// Refresh interval. Values `validate` would reject fall back to the default.
    pub fn update_rate(&self) -> Duration {
        Duration::try_from_secs_f64(self.update_rate_secs)
            .ok()
            .filter(|rate| !rate.is_zero())
            .unwrap_or(DEFAULT_UPDATE_RATE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = IndexerConfig::from_json(
            r#"{
                "update_rate_secs": 5,
                "exchanges": [
                    {"name": "coingecko", "priority": 2, "coin_overrides": {"ONE": "harmony"}},
                    {"name": "binance_us", "priority": 1, "update_rate_secs": 30,
                     "api_url": "https://api.binance.us"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.update_rate(), Duration::from_secs(5));
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.exchanges.len(), 2);
        assert_eq!(config.exchanges[0].name, ExchangeKind::Coingecko);
        assert_eq!(config.exchanges[0].overrides().get("one").map(String::as_str), Some("harmony"));
        assert_eq!(config.exchanges[1].name, ExchangeKind::BinanceUs);
        assert_eq!(config.exchanges[1].update_rate_secs, Some(30));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(IndexerConfig::from_json(r#"{"exchanges": []}"#).is_err());
        assert!(IndexerConfig::from_json(r#"{"update_rate_secs": 0}"#).is_err());
        let err = IndexerConfig::from_json(
            r#"{"exchanges": [{"name": "kucoin", "priority": 1, "api_url": "not a url"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, IndexerError::Config(_)));
        assert!(IndexerConfig::from_json(r#"{"exchanges": [{"name": "ftx", "priority": 1}]}"#).is_err());

        let err = IndexerConfig::from_json(r#"{"update_rate_secs": 1e300}"#).unwrap_err();
        assert!(matches!(err, IndexerError::Config(_)));
    }

    #[test]
    fn unrepresentable_rate_does_not_panic() {
        let config = IndexerConfig {
            update_rate_secs: 1e300,
            ..IndexerConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.update_rate(), Duration::from_secs(3));
    }
}
