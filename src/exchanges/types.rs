use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IndexerError, Result};

/// Exchange-local identity of a listed symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinDefinition {
    pub coin_id: String,
    pub symbol: String,
    pub name: Option<String>,
}

impl CoinDefinition {
    pub fn new(coin_id: impl Into<String>, symbol: &str, name: Option<String>) -> Self {
        Self {
            coin_id: coin_id.into(),
            symbol: symbol.trim().to_lowercase(),
            name: name.filter(|n| !n.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PercentChange {
    Value(Decimal),
    Unavailable,
}

impl PercentChange {
    /// Missing or non-numeric change data is not an error, just unavailable.
    pub fn from_value(value: &Value) -> Self {
        match parse_decimal(value) {
            Ok(d) => Self::Value(d.round_dp(2)),
            Err(_) => Self::Unavailable,
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        match self {
            Self::Value(d) => Some(*d),
            Self::Unavailable => None,
        }
    }
}

impl fmt::Display for PercentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(d) => write!(f, "{}", d),
            Self::Unavailable => write!(f, "N/A"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub price: Decimal,
    pub percent_change: PercentChange,
}

impl Ticker {
    pub fn new(price: Decimal, percent_change: PercentChange) -> Self {
        Self { price, percent_change }
    }

    /// Coerces raw exchange values. A non-numeric price is a conversion error;
    /// a non-numeric change is recorded as unavailable.
    pub fn from_values(price: &Value, percent_change: &Value) -> Result<Self> {
        Ok(Self {
            price: parse_decimal(price)?,
            percent_change: PercentChange::from_value(percent_change),
        })
    }
}

/// Extended metadata served by the info exchange on explicit request only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinInfo {
    pub name: Option<String>,
    pub homepage: Option<String>,
    pub reddit: Option<String>,
    pub source_page: Option<String>,
    pub total_supply: Option<Decimal>,
    pub circulating_supply: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub ath: Option<Decimal>,
    pub ath_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub repos: Vec<String>,
    pub algorithm: Option<String>,
    pub block_time_minutes: Option<Decimal>,
    pub image: Option<String>,
}

pub fn parse_decimal(value: &Value) -> Result<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(IndexerError::Conversion(format!("expected a number, got {}", other))),
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|e| IndexerError::Conversion(format!("{}: {}", raw, e)))
}
