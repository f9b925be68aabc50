use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::debug;

use super::types::CoinDefinition;
use crate::error::{IndexerError, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub updated: usize,
    pub rejected: usize,
}

#[derive(Debug, Default)]
struct Listings {
    baseline: HashSet<String>,
    new_coins: HashMap<String, DateTime<Utc>>,
}

/// Symbol catalog owned by one exchange and maintained by its discovery loop.
#[derive(Debug)]
pub struct Catalog {
    exchange: String,
    coins: RwLock<HashMap<String, CoinDefinition>>,
    overrides: HashMap<String, String>,
    ready: watch::Sender<bool>,
    listings: Mutex<Listings>,
    announces_listings: bool,
}

impl Catalog {
    pub fn new(exchange: &str, overrides: HashMap<String, String>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            exchange: exchange.to_string(),
            coins: RwLock::new(HashMap::new()),
            overrides,
            ready,
            listings: Mutex::new(Listings::default()),
            announces_listings: true,
        }
    }

    pub fn with_listings(mut self, announce: bool) -> Self {
        self.announces_listings = announce;
        self
    }

    pub fn announces_listings(&self) -> bool {
        self.announces_listings
    }

    pub async fn get(&self, symbol: &str) -> Option<CoinDefinition> {
        self.coins.read().await.get(&symbol.trim().to_lowercase()).cloned()
    }

    pub async fn get_coin_definition(&self, symbol: &str) -> Result<CoinDefinition> {
        self.get(symbol)
            .await
            .ok_or_else(|| IndexerError::not_found_on(symbol, &self.exchange))
    }

    pub async fn contains(&self, symbol: &str) -> bool {
        self.coins.read().await.contains_key(symbol)
    }

    pub async fn len(&self) -> usize {
        self.coins.read().await.len()
    }

    pub async fn symbols(&self) -> HashSet<String> {
        self.coins.read().await.keys().cloned().collect()
    }

    /// Adds unseen symbols and refreshes identity of known ones in place.
    /// Entries contradicting a pinned override are rejected.
    pub async fn merge(&self, entries: Vec<CoinDefinition>) -> MergeStats {
        let mut stats = MergeStats::default();
        let mut coins = self.coins.write().await;
        for entry in entries {
            if let Some(pinned) = self.overrides.get(&entry.symbol) {
                if !pinned.eq_ignore_ascii_case(&entry.coin_id) {
                    stats.rejected += 1;
                    continue;
                }
            }
            match coins.get_mut(&entry.symbol) {
                Some(existing) => {
                    existing.coin_id = entry.coin_id;
                    existing.name = entry.name;
                    stats.updated += 1;
                }
                None => {
                    coins.insert(entry.symbol.clone(), entry);
                    stats.added += 1;
                }
            }
        }
        stats
    }

    /// Readiness is sticky. The first call snapshots the listing baseline.
    pub async fn mark_ready(&self) {
        if self.is_ready() {
            return;
        }
        let symbols = self.symbols().await;
        debug!(exchange = %self.exchange, coins = symbols.len(), "catalog ready");
        self.listings.lock().await.baseline = symbols;
        self.ready.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // the sender lives as long as self, so this only returns once ready
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Symbols that appeared since the last check, with the time they were first seen.
    pub async fn check_new_coins(&self) -> HashMap<String, DateTime<Utc>> {
        if !self.is_ready() {
            return HashMap::new();
        }
        let current = self.symbols().await;
        let mut listings = self.listings.lock().await;
        let now = Utc::now();
        let fresh: Vec<String> = current.difference(&listings.baseline).cloned().collect();
        for symbol in fresh {
            listings.new_coins.entry(symbol).or_insert(now);
        }
        listings.baseline = current;
        listings.new_coins.clone()
    }

    pub async fn clear_new_coins(&self) {
        self.listings.lock().await.new_coins.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str, symbol: &str, name: &str) -> CoinDefinition {
        CoinDefinition::new(id, symbol, Some(name.to_string()))
    }

    #[tokio::test]
    async fn merge_adds_and_updates_in_place() {
        let catalog = Catalog::new("A", HashMap::new());
        let stats = catalog.merge(vec![def("bitcoin", "BTC", "Bitcoin"), def("ethereum", "eth", "Ethereum")]).await;
        assert_eq!(stats, MergeStats { added: 2, updated: 0, rejected: 0 });

        let stats = catalog.merge(vec![def("bitcoin-v2", "btc", "Bitcoin 2")]).await;
        assert_eq!(stats.updated, 1);
        let btc = catalog.get("Btc").await.unwrap();
        assert_eq!(btc.coin_id, "bitcoin-v2");
        assert_eq!(btc.name.as_deref(), Some("Bitcoin 2"));
        assert_eq!(catalog.len().await, 2);
    }

    #[tokio::test]
    async fn overrides_reject_colliding_tickers() {
        let overrides = HashMap::from([("one".to_string(), "harmony".to_string())]);
        let catalog = Catalog::new("A", overrides);
        let stats = catalog
            .merge(vec![def("menlo-one", "one", "Menlo One"), def("harmony", "one", "Harmony")])
            .await;
        assert_eq!(stats.rejected, 1);
        assert_eq!(catalog.get("ONE").await.unwrap().coin_id, "harmony");
    }

    #[tokio::test]
    async fn lookup_failure_names_exchange() {
        let catalog = Catalog::new("KuCoin", HashMap::new());
        let err = catalog.get_coin_definition("xyz").await.unwrap_err();
        match err {
            IndexerError::CoinNotFound { symbol, exchange } => {
                assert_eq!(symbol, "xyz");
                assert_eq!(exchange.as_deref(), Some("KuCoin"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn new_coins_are_diffed_against_ready_snapshot() {
        let catalog = Catalog::new("A", HashMap::new());
        catalog.merge(vec![def("bitcoin", "btc", "Bitcoin")]).await;
        assert!(catalog.check_new_coins().await.is_empty());

        catalog.mark_ready().await;
        assert!(catalog.check_new_coins().await.is_empty());

        catalog.merge(vec![def("dogecoin", "doge", "Dogecoin")]).await;
        let new = catalog.check_new_coins().await;
        assert_eq!(new.len(), 1);
        assert!(new.contains_key("doge"));
        // still reported until drained
        assert!(catalog.check_new_coins().await.contains_key("doge"));

        catalog.clear_new_coins().await;
        assert!(catalog.check_new_coins().await.is_empty());
    }

    #[tokio::test]
    async fn readiness_is_sticky_and_awaitable() {
        let catalog = std::sync::Arc::new(Catalog::new("A", HashMap::new()));
        assert!(!catalog.is_ready());

        let waiter = {
            let catalog = catalog.clone();
            tokio::spawn(async move { catalog.wait_ready().await })
        };
        catalog.mark_ready().await;
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        catalog.mark_ready().await;
        assert!(catalog.is_ready());
    }
}
