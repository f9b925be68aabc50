use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::catalog::Catalog;
use super::types::{CoinDefinition, CoinInfo, Ticker};
use crate::error::IndexerError;

#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Lower value wins when several exchanges list the same symbol.
    fn priority(&self) -> i32;

    fn catalog(&self) -> &Catalog;

    fn discovery_interval(&self) -> Duration;

    /// One fetch of the source's listing endpoint. Malformed entries are
    /// skipped; an unusable response fails the whole pass.
    async fn fetch_catalog(&self) -> Result<Vec<CoinDefinition>>;

    /// One batched request covering every given coin, keyed by symbol.
    async fn fetch_tickers(&self, coins: &[CoinDefinition]) -> Result<HashMap<String, Ticker>>;

    fn supports_info(&self) -> bool {
        false
    }

    async fn fetch_coin_info(&self, _coin: &CoinDefinition) -> Result<CoinInfo> {
        Err(IndexerError::info_unavailable(format!("{} does not serve coin info", self.name())).into())
    }

    fn is_ready(&self) -> bool {
        self.catalog().is_ready()
    }

    async fn get_coin_definition(&self, symbol: &str) -> crate::error::Result<CoinDefinition> {
        self.catalog().get_coin_definition(symbol).await
    }

    /// Resolves symbols against the catalog, skipping unknown ones, then
    /// prices all of them in a single round trip.
    async fn get_tickers(&self, symbols: &[String]) -> Result<HashMap<String, Ticker>> {
        let mut coins = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(coin) = self.catalog().get(symbol).await {
                coins.push(coin);
            }
        }
        if coins.is_empty() {
            return Ok(HashMap::new());
        }
        self.fetch_tickers(&coins).await
    }

    async fn get_coin_info(&self, symbol: &str) -> crate::error::Result<CoinInfo> {
        if !self.supports_info() {
            return Err(IndexerError::info_unavailable(format!("{} does not serve coin info", self.name())));
        }
        let coin = self.get_coin_definition(symbol).await?;
        self.fetch_coin_info(&coin)
            .await
            .map_err(|e| IndexerError::exchange(self.name(), e))
    }
}
