pub mod binance_us;
pub mod catalog;
pub mod coingecko;
pub mod discovery;
pub mod http;
pub mod kucoin;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{ExchangeConfig, ExchangeKind, IndexerConfig};
use binance_us::BinanceUsExchange;
use catalog::Catalog;
use coingecko::CoinGeckoExchange;
use kucoin::KuCoinExchange;
use traits::PriceSource;
use types::{CoinDefinition, CoinInfo, Ticker};

#[derive(Debug)]
pub enum Exchange {
    CoinGecko(CoinGeckoExchange),
    KuCoin(KuCoinExchange),
    BinanceUs(BinanceUsExchange),
}

impl Exchange {
    /// Builds the variant named by the config's type tag.
    pub fn from_config(config: &ExchangeConfig, timeout: Duration) -> Result<Self> {
        Ok(match config.name {
            ExchangeKind::Coingecko => Exchange::CoinGecko(CoinGeckoExchange::new(config, timeout)?),
            ExchangeKind::Kucoin => Exchange::KuCoin(KuCoinExchange::new(config, timeout)?),
            ExchangeKind::BinanceUs => Exchange::BinanceUs(BinanceUsExchange::new(config, timeout)?),
        })
    }
}

pub fn build_exchanges(config: &IndexerConfig) -> Result<Vec<Arc<dyn PriceSource>>> {
    config
        .exchanges
        .iter()
        .map(|c| Ok(Arc::new(Exchange::from_config(c, config.request_timeout())?) as Arc<dyn PriceSource>))
        .collect()
}

#[async_trait]
impl PriceSource for Exchange {
    fn name(&self) -> &str {
        match self {
            Exchange::CoinGecko(e) => e.name(),
            Exchange::KuCoin(e) => e.name(),
            Exchange::BinanceUs(e) => e.name(),
        }
    }

    fn priority(&self) -> i32 {
        match self {
            Exchange::CoinGecko(e) => e.priority(),
            Exchange::KuCoin(e) => e.priority(),
            Exchange::BinanceUs(e) => e.priority(),
        }
    }

    fn catalog(&self) -> &Catalog {
        match self {
            Exchange::CoinGecko(e) => e.catalog(),
            Exchange::KuCoin(e) => e.catalog(),
            Exchange::BinanceUs(e) => e.catalog(),
        }
    }

    fn discovery_interval(&self) -> Duration {
        match self {
            Exchange::CoinGecko(e) => e.discovery_interval(),
            Exchange::KuCoin(e) => e.discovery_interval(),
            Exchange::BinanceUs(e) => e.discovery_interval(),
        }
    }

    async fn fetch_catalog(&self) -> Result<Vec<CoinDefinition>> {
        match self {
            Exchange::CoinGecko(e) => e.fetch_catalog().await,
            Exchange::KuCoin(e) => e.fetch_catalog().await,
            Exchange::BinanceUs(e) => e.fetch_catalog().await,
        }
    }

    async fn fetch_tickers(&self, coins: &[CoinDefinition]) -> Result<HashMap<String, Ticker>> {
        match self {
            Exchange::CoinGecko(e) => e.fetch_tickers(coins).await,
            Exchange::KuCoin(e) => e.fetch_tickers(coins).await,
            Exchange::BinanceUs(e) => e.fetch_tickers(coins).await,
        }
    }

    fn supports_info(&self) -> bool {
        match self {
            Exchange::CoinGecko(e) => e.supports_info(),
            Exchange::KuCoin(e) => e.supports_info(),
            Exchange::BinanceUs(e) => e.supports_info(),
        }
    }

    async fn fetch_coin_info(&self, coin: &CoinDefinition) -> Result<CoinInfo> {
        match self {
            Exchange::CoinGecko(e) => e.fetch_coin_info(coin).await,
            Exchange::KuCoin(e) => e.fetch_coin_info(coin).await,
            Exchange::BinanceUs(e) => e.fetch_coin_info(coin).await,
        }
    }
}
