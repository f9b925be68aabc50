use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use crypto_indexer::{CoinQuery, IndexerConfig, PriceIndexer};
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "crypto-indexer", about = "Multi-exchange crypto price indexer")]
struct Args {
    /// JSON config file. Defaults to CoinGecko only.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Symbols to track and print every refresh, e.g. --watch btc --watch eth
    #[arg(short, long)]
    watch: Vec<String>,

    /// Print extended info for each watched symbol once at startup.
    #[arg(long)]
    info: bool,

    /// Write logs to <dir>/indexer.log instead of stdout.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_logging() -> Result<()> {
    fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {}", e))
}

pub fn init_file_logging(dir: &Path) -> Result<()> {
    let file_appender = RollingFileAppender::new(Rotation::NEVER, dir, "indexer.log");

    fmt()
        .with_env_filter(env_filter())
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_level(true)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {}", e))
}

struct App {
    indexer: Arc<PriceIndexer>,
    watch: Vec<String>,
}

impl App {
    fn new(config: &IndexerConfig, watch: Vec<String>) -> Result<Self> {
        let indexer = Arc::new(PriceIndexer::from_config(config)?);
        Ok(Self { indexer, watch })
    }

    async fn register_watched(&mut self, with_info: bool) {
        let mut tracked = Vec::new();
        for symbol in &self.watch {
            let query = if with_info {
                CoinQuery::default().wait().with_info()
            } else {
                CoinQuery::default().wait()
            };
            match self.indexer.get_coin(symbol, query).await {
                Ok(coin) => {
                    info!(
                        "Tracking {} - {} - indexed from {}",
                        coin.display_symbol(),
                        coin.display_name(),
                        coin.last_exchange.as_deref().unwrap_or("?")
                    );
                    if let Some(info) = &coin.info {
                        info!("{} info: {}", coin.display_symbol(), serde_json::to_string(info).unwrap_or_default());
                    }
                    tracked.push(coin.symbol);
                }
                Err(e) if e.is_not_found() => warn!("{}", e),
                Err(e) => error!(symbol = %symbol, "failed to register: {}", e),
            }
        }
        self.watch = tracked;
    }

    async fn report(&self) {
        for symbol in &self.watch {
            match self.indexer.get_coin(symbol, CoinQuery::default()).await {
                Ok(coin) => info!("{}", coin),
                Err(e) => warn!(symbol = %symbol, "{}", e),
            }
        }

        let listings = self.indexer.check_new_coins().await;
        for (exchange, symbols) in &listings {
            for symbol in symbols {
                info!("New listing on {}: {}", exchange, symbol.to_uppercase());
            }
        }
        if !listings.is_empty() {
            self.indexer.clear_new_coins().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    match &args.log_dir {
        Some(dir) => init_file_logging(dir)?,
        None => init_logging()?,
    }

    let config = match &args.config {
        Some(path) => IndexerConfig::from_file(path)?,
        None => IndexerConfig::default(),
    };
    info!(exchanges = config.exchanges.len(), "config loaded");

    let mut app = App::new(&config, args.watch)?;
    let handles = app.indexer.start();
    app.indexer.wait_until_ready().await;
    app.register_watched(args.info).await;

    let mut ticker = tokio::time::interval(config.update_rate());
    loop {
        tokio::select! {
            _ = ticker.tick() => app.report().await,
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    for handle in handles {
        handle.abort();
    }
    Ok(())
}
