//! Market data boundary.
//!
//! Everything that talks to the upstream quote source lives here. The rest of
//! the crate only sees the `QuoteProvider` trait and the plain data types
//! below, so resolvers can be tested against in-memory providers.
//!
//! # Data Sources
//! - **Yahoo chart API** (default): minute bars with extended hours, daily
//!   bars, batched spark series and a lightweight quote snapshot

mod provider;
mod rate_limiter;
mod yahoo;

pub use provider::{ProviderError, QuoteProvider};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};
pub use yahoo::YahooAdapter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Core Data Types
// ============================================================================

/// Bar interval requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// 1-minute bars
    M1,
    /// Daily bars (regular session)
    Daily,
}

impl Timeframe {
    /// Interval string understood by the chart API
    pub fn to_api_interval(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::Daily => "1d",
        }
    }

    /// Whether the timeframe is intraday
    pub fn is_intraday(&self) -> bool {
        !matches!(self, Self::Daily)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::M1 => write!(f, "1M"),
            Self::Daily => write!(f, "D"),
        }
    }
}

/// A single bar (OHLCV). Bars whose close was missing upstream are never
/// constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Closing prices of a candle series, oldest first.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Last close of a series, if any.
pub fn last_close(candles: &[Candle]) -> Option<f64> {
    candles.last().map(|c| c.close)
}

/// Latest close per symbol from one batched intraday request.
///
/// Providers normalize both the single-symbol and the multi-symbol response
/// shapes into this map, keyed by upper-cased symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchQuotes {
    prices: HashMap<String, f64>,
}

impl BatchQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest close for a symbol
    pub fn insert(&mut self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_uppercase(), price);
    }

    /// Latest close for a symbol
    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.prices.get(&symbol.to_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(String, f64)> for BatchQuotes {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut quotes = Self::new();
        for (symbol, price) in iter {
            quotes.insert(&symbol, price);
        }
        quotes
    }
}

// ============================================================================
// Tests
// ============================================================================
