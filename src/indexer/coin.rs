use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::exchanges::types::{CoinDefinition, CoinInfo, PercentChange, Ticker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Unknown,
}

impl Direction {
    /// Non-negative change counts as up.
    pub fn from_change(change: &PercentChange) -> Self {
        match change.value() {
            Some(d) if d.is_sign_negative() && !d.is_zero() => Direction::Down,
            Some(_) => Direction::Up,
            None => Direction::Unknown,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Direction::Up => "⬈",
            Direction::Down => "⬊",
            Direction::Unknown => "-",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Last-known identity and market snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coin {
    pub coin_id: String,
    pub symbol: String,
    pub name: Option<String>,
    pub price: Decimal,
    pub percent_change_24h: PercentChange,
    pub direction: Direction,
    pub last_exchange: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub info: Option<CoinInfo>,
}

impl Coin {
    pub fn new(definition: &CoinDefinition) -> Self {
        Self {
            coin_id: definition.coin_id.clone(),
            symbol: definition.symbol.to_lowercase(),
            name: definition.name.clone(),
            price: Decimal::ZERO,
            percent_change_24h: PercentChange::Unavailable,
            direction: Direction::Unknown,
            last_exchange: None,
            last_updated: None,
            info: None,
        }
    }

    /// Applies a snapshot. Provenance only moves when a source is given.
    pub fn update(&mut self, ticker: &Ticker, source: Option<&str>) {
        self.price = ticker.price;
        self.percent_change_24h = ticker.percent_change;
        self.direction = Direction::from_change(&ticker.percent_change);
        if let Some(source) = source {
            self.last_exchange = Some(source.to_string());
        }
        self.last_updated = Some(Utc::now());
    }

    /// Same as [`Coin::update`] but coerces raw exchange values first. A
    /// non-numeric price fails without touching the coin.
    pub fn update_from_values(&mut self, price: &Value, percent_change: &Value, source: Option<&str>) -> Result<()> {
        let ticker = Ticker::from_values(price, percent_change)?;
        self.update(&ticker, source);
        Ok(())
    }

    pub fn has_price(&self) -> bool {
        self.last_updated.is_some()
    }

    pub fn display_symbol(&self) -> String {
        self.symbol.to_uppercase()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.coin_id)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ${} {}% {}",
            self.display_symbol(),
            self.price.normalize(),
            self.percent_change_24h,
            self.direction.arrow()
        )
    }
}
