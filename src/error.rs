#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("Coin by name: {} was not found{}", .symbol.to_uppercase(), .exchange.as_ref().map(|e| format!(" on {}", e)).unwrap_or_default())]
    CoinNotFound {
        symbol: String,
        exchange: Option<String>,
    },

    #[error("Coin info is unavailable: {0}")]
    InfoUnavailable(String),

    #[error("No price available yet for {}", .0.to_uppercase())]
    PriceUnavailable(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Exchange error ({exchange}): {message}")]
    Exchange { exchange: String, message: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexerError {
    pub fn not_found(symbol: &str) -> Self {
        Self::CoinNotFound {
            symbol: symbol.to_lowercase(),
            exchange: None,
        }
    }

    pub fn not_found_on(symbol: &str, exchange: &str) -> Self {
        Self::CoinNotFound {
            symbol: symbol.to_lowercase(),
            exchange: Some(exchange.to_string()),
        }
    }

    pub fn exchange(exchange: &str, err: impl std::fmt::Display) -> Self {
        Self::Exchange {
            exchange: exchange.to_string(),
            message: err.to_string(),
        }
    }

    pub fn info_unavailable(reason: impl std::fmt::Display) -> Self {
        Self::InfoUnavailable(reason.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CoinNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
