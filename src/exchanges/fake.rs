//! In-memory exchange used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;

use super::catalog::Catalog;
use super::traits::PriceSource;
use super::types::{CoinDefinition, CoinInfo, PercentChange, Ticker};

/// Routes library logs to the test harness; safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct FakeExchange {
    name: String,
    priority: i32,
    catalog: Catalog,
    listing: Mutex<Vec<CoinDefinition>>,
    prices: Mutex<HashMap<String, Ticker>>,
    ticker_delay: Mutex<Option<Duration>>,
    failing: AtomicBool,
    info: bool,
    discovery_interval: Duration,
    pub ticker_calls: AtomicUsize,
}

impl FakeExchange {
    pub fn new(name: &str, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            priority,
            catalog: Catalog::new(name, HashMap::new()),
            listing: Mutex::new(Vec::new()),
            prices: Mutex::new(HashMap::new()),
            ticker_delay: Mutex::new(None),
            failing: AtomicBool::new(false),
            info: false,
            discovery_interval: Duration::from_secs(60),
            ticker_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_info(mut self) -> Self {
        self.info = true;
        self
    }

    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    pub fn list(&self, coin_id: &str, symbol: &str, name: &str) {
        self.listing
            .lock()
            .unwrap()
            .push(CoinDefinition::new(coin_id, symbol, Some(name.to_string())));
    }

    pub fn set_price(&self, coin_id: &str, price: i64, change: Option<&str>) {
        let change = match change {
            Some(c) => PercentChange::Value(c.parse().unwrap()),
            None => PercentChange::Unavailable,
        };
        self.prices
            .lock()
            .unwrap()
            .insert(coin_id.to_string(), Ticker::new(Decimal::from(price), change));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_ticker_delay(&self, delay: Option<Duration>) {
        *self.ticker_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl PriceSource for FakeExchange {
    fn name(&self) -> &str {
        &self.name
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
        if self.failing.load(Ordering::SeqCst) {
            bail!("{} listing unavailable", self.name);
        }
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn fetch_tickers(&self, coins: &[CoinDefinition]) -> Result<HashMap<String, Ticker>> {
        self.ticker_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.ticker_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("{} ticker unavailable", self.name);
        }
        let prices = self.prices.lock().unwrap();
        Ok(coins
            .iter()
            .filter_map(|c| prices.get(&c.coin_id).map(|t| (c.symbol.clone(), *t)))
            .collect())
    }

    fn supports_info(&self) -> bool {
        self.info
    }

    async fn fetch_coin_info(&self, coin: &CoinDefinition) -> Result<CoinInfo> {
        Ok(CoinInfo {
            name: coin.name.clone(),
            source_page: Some(format!("https://example.test/coins/{}", coin.coin_id)),
            ..CoinInfo::default()
        })
    }
}
