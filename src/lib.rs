pub mod config;
pub mod error;
pub mod exchanges;
pub mod indexer;

pub use config::{ExchangeConfig, ExchangeKind, IndexerConfig};
pub use error::IndexerError;
pub use exchanges::traits::PriceSource;
pub use indexer::{Coin, CoinQuery, Direction, PriceIndexer};
