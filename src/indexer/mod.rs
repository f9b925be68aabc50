pub mod coin;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result};
use crate::exchanges::discovery::spawn_discovery;
use crate::exchanges::traits::PriceSource;
use crate::exchanges::types::CoinInfo;
use crate::exchanges::build_exchanges;
pub use coin::{Coin, Direction};

/// Options for [`PriceIndexer::get_coin`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoinQuery {
    pub wait: bool,
    pub include_info: bool,
}

impl CoinQuery {
    /// Don't return a zero-valued placeholder for a coin that was never priced.
    pub fn wait(mut self) -> Self {
        self.wait = true;
        self
    }

    pub fn with_info(mut self) -> Self {
        self.include_info = true;
        self
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub updated: usize,
    pub failed: Vec<(String, String)>,
    pub unassigned: Vec<String>,
}

type Assignment = (Arc<dyn PriceSource>, Vec<String>);

pub struct PriceIndexer {
    exchanges: Vec<Arc<dyn PriceSource>>,
    info_exchange: Option<Arc<dyn PriceSource>>,
    coins: RwLock<HashMap<String, Coin>>,
    update_rate: Duration,
    request_timeout: Duration,
}

impl std::fmt::Debug for PriceIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceIndexer")
            .field("exchanges", &self.exchanges.iter().map(|e| e.name()).collect::<Vec<_>>())
            .field("info_exchange", &self.info_exchange.as_ref().map(|e| e.name()))
            .field("update_rate", &self.update_rate)
            .finish_non_exhaustive()
    }
}

impl PriceIndexer {
    /// Exchanges are ranked by ascending priority; ties keep their given order.
    /// The best-ranked info-capable exchange becomes the info exchange.
    pub fn new(mut exchanges: Vec<Arc<dyn PriceSource>>, update_rate: Duration, request_timeout: Duration) -> Self {
        exchanges.sort_by_key(|e| e.priority());
        let info_exchange = exchanges.iter().find(|e| e.supports_info()).cloned();
        Self {
            exchanges,
            info_exchange,
            coins: RwLock::new(HashMap::new()),
            update_rate,
            request_timeout,
        }
    }

    pub fn from_config(config: &IndexerConfig) -> Result<Self> {
        config.validate()?;
        let exchanges = build_exchanges(config).map_err(|e| IndexerError::Config(format!("{:#}", e)))?;
        Ok(Self::new(exchanges, config.update_rate(), config.request_timeout()))
    }

    pub fn exchanges(&self) -> &[Arc<dyn PriceSource>] {
        &self.exchanges
    }

    pub fn info_exchange(&self) -> Option<&Arc<dyn PriceSource>> {
        self.info_exchange.as_ref()
    }

    /// Starts every exchange's discovery loop and the shared refresh loop.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles: Vec<_> = self.exchanges.iter().cloned().map(spawn_discovery).collect();
        handles.push(self.spawn_refresh());
        handles
    }

    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let indexer = self.clone();
        tokio::spawn(async move {
            loop {
                let report = indexer.refresh().await;
                debug!(
                    updated = report.updated,
                    failed = report.failed.len(),
                    unassigned = report.unassigned.len(),
                    "refresh tick complete"
                );
                tokio::time::sleep(indexer.update_rate).await;
            }
        })
    }

    pub fn is_ready(&self) -> bool {
        self.exchanges.iter().all(|e| e.is_ready())
    }

    /// Resolves once every exchange has completed its first discovery pass.
    pub async fn wait_until_ready(&self) {
        for exchange in &self.exchanges {
            if !exchange.is_ready() {
                info!(exchange = %exchange.name(), "waiting for exchange catalog");
            }
            exchange.catalog().wait_ready().await;
        }
        info!(exchanges = self.exchanges.len(), "all exchanges ready");
    }

    pub async fn tracked_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<_> = self.coins.read().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub async fn get_coin(&self, symbol: &str, query: CoinQuery) -> Result<Coin> {
        let symbol = normalize(symbol);
        let existing = self.coins.read().await.get(&symbol).cloned();
        let mut coin = match existing {
            Some(coin) => coin,
            None => self.add_new_coin(&symbol).await?,
        };

        if query.wait && !coin.has_price() {
            let report = self.refresh_symbols(vec![symbol.clone()]).await;
            if let Some((exchange, error)) = report.failed.into_iter().next() {
                return Err(IndexerError::Exchange {
                    exchange,
                    message: error,
                });
            }
            if let Some(refreshed) = self.coins.read().await.get(&symbol) {
                coin = refreshed.clone();
            }
            // the exchange answered but had no usable ticker for this symbol
            if !coin.has_price() {
                return Err(IndexerError::PriceUnavailable(symbol));
            }
        }

        if query.include_info {
            let info = self.get_coin_info(&symbol).await?;
            if let Some(stored) = self.coins.write().await.get_mut(&symbol) {
                stored.info = Some(info.clone());
            }
            coin.info = Some(info);
        }
        Ok(coin)
    }

    /// Registers a symbol under the best-ranked exchange that lists it. Nothing
    /// is inserted when no exchange recognizes the symbol.
    pub async fn add_new_coin(&self, symbol: &str) -> Result<Coin> {
        let symbol = normalize(symbol);

        let mut resolved = None;
        for exchange in &self.exchanges {
            if let Some(definition) = exchange.catalog().get(&symbol).await {
                resolved = Some((exchange, definition));
                break;
            }
        }
        let (source, definition) = resolved.ok_or_else(|| IndexerError::not_found(&symbol))?;
        let mut coin = Coin::new(&definition);

        if let Some(info_exchange) = &self.info_exchange {
            if !Arc::ptr_eq(info_exchange, source) {
                match info_exchange.get_coin_definition(&symbol).await {
                    Ok(canonical) => {
                        if canonical.name.is_some() {
                            coin.name = canonical.name;
                        }
                    }
                    Err(e) => debug!(symbol = %symbol, "no canonical name: {}", e),
                }
            }
        }

        let mut coins = self.coins.write().await;
        let coin = coins.entry(symbol.clone()).or_insert(coin).clone();
        info!(symbol = %symbol, coin_id = %coin.coin_id, exchange = %source.name(), "registered coin");
        Ok(coin)
    }

    pub async fn get_coin_info(&self, symbol: &str) -> Result<CoinInfo> {
        let info_exchange = self
            .info_exchange
            .as_ref()
            .ok_or_else(|| IndexerError::info_unavailable("no info exchange is configured"))?;
        let symbol = normalize(symbol);
        match info_exchange.get_coin_info(&symbol).await {
            // a symbol priced elsewhere may simply be missing from the info exchange
            Err(IndexerError::CoinNotFound { .. }) => Err(IndexerError::info_unavailable(format!(
                "{} has no entry for {}",
                info_exchange.name(),
                symbol.to_uppercase()
            ))),
            result => result,
        }
    }

    /// One refresh tick over a snapshot of the currently tracked symbols.
    pub async fn refresh(&self) -> RefreshReport {
        let symbols: Vec<String> = self.coins.read().await.keys().cloned().collect();
        self.refresh_symbols(symbols).await
    }

    async fn refresh_symbols(&self, symbols: Vec<String>) -> RefreshReport {
        let mut report = RefreshReport::default();
        if symbols.is_empty() {
            return report;
        }

        let (assignments, unassigned) = self.assign(symbols).await;
        for symbol in &unassigned {
            warn!(symbol = %symbol, "no exchange lists this coin anymore, serving last known price");
        }
        report.unassigned = unassigned;

        let request_timeout = self.request_timeout;
        let mut fetches: FuturesUnordered<_> = assignments
            .into_iter()
            .map(|(exchange, symbols)| async move {
                let result = tokio::time::timeout(request_timeout, exchange.get_tickers(&symbols)).await;
                (exchange, result)
            })
            .collect();

        while let Some((exchange, result)) = fetches.next().await {
            let tickers = match result {
                Ok(Ok(tickers)) => tickers,
                Ok(Err(e)) => {
                    warn!(exchange = %exchange.name(), "ticker fetch failed: {:#}", e);
                    report.failed.push((exchange.name().to_string(), format!("{:#}", e)));
                    continue;
                }
                Err(_) => {
                    warn!(exchange = %exchange.name(), timeout = ?request_timeout, "ticker fetch timed out");
                    report.failed.push((exchange.name().to_string(), "request timed out".to_string()));
                    continue;
                }
            };

            let mut coins = self.coins.write().await;
            for (symbol, ticker) in tickers {
                if let Some(coin) = coins.get_mut(&symbol) {
                    coin.update(&ticker, Some(exchange.name()));
                    report.updated += 1;
                }
            }
        }
        report
    }

    /// Each symbol goes to exactly one exchange: the best-ranked one listing it.
    async fn assign(&self, symbols: Vec<String>) -> (Vec<Assignment>, Vec<String>) {
        let mut assigned: Vec<Vec<String>> = vec![Vec::new(); self.exchanges.len()];
        let mut unassigned = Vec::new();
        'symbols: for symbol in symbols {
            for (idx, exchange) in self.exchanges.iter().enumerate() {
                if exchange.catalog().contains(&symbol).await {
                    assigned[idx].push(symbol);
                    continue 'symbols;
                }
            }
            unassigned.push(symbol);
        }

        let assignments = self
            .exchanges
            .iter()
            .cloned()
            .zip(assigned)
            .filter(|(_, symbols)| !symbols.is_empty())
            .collect();
        (assignments, unassigned)
    }

    /// Newly listed symbols per exchange since the last drain.
    pub async fn check_new_coins(&self) -> HashMap<String, BTreeSet<String>> {
        let mut listings = HashMap::new();
        for exchange in &self.exchanges {
            if !exchange.catalog().announces_listings() {
                continue;
            }
            let new_coins = exchange.catalog().check_new_coins().await;
            if !new_coins.is_empty() {
                listings.insert(exchange.name().to_string(), new_coins.into_keys().collect());
            }
        }
        listings
    }

    pub async fn clear_new_coins(&self) {
        for exchange in &self.exchanges {
            exchange.catalog().clear_new_coins().await;
        }
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_lowercase()
}
