//! Price resolution with tiered fallback.
//!
//! A quote is obtained by walking an ordered list of [`PriceTier`]s and
//! taking the first valid price. Each tier runs under its own time budget,
//! which starts once the tier has been admitted by the upstream rate limit.
//! An error, a timeout, an empty answer or an unusable price all move on to
//! the next tier. Running out of tiers is an ordinary outcome, not an error.

pub mod fx;
pub mod resolver;

pub use fx::{ExchangeRate, FxResolver, RateSource};
pub use resolver::{
    BatchTier, DailyBarTier, IntradayTier, LastQuoteTier, QuoteResolver,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::data::ProviderError;

/// Which tier produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    /// User-entered override
    Manual,
    /// Cycle-wide batched 1-minute request
    BatchIntraday,
    /// Single-symbol 1-minute request
    Intraday,
    /// Latest regular-session daily close
    DailyBar,
    /// Lightweight quote snapshot
    LastQuote,
}

impl std::fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::BatchIntraday => "batch_intraday",
            Self::Intraday => "intraday",
            Self::DailyBar => "daily_bar",
            Self::LastQuote => "last_quote",
        };
        f.write_str(s)
    }
}

/// A usable price is finite and strictly positive.
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Result of resolving one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    pub symbol: String,
    pub outcome: QuoteOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuoteOutcome {
    Resolved { price: f64, source: QuoteSource },
    Unavailable { reason: String },
}

impl QuoteResult {
    pub fn resolved(symbol: &str, price: f64, source: QuoteSource) -> Self {
        Self {
            symbol: symbol.to_string(),
            outcome: QuoteOutcome::Resolved { price, source },
        }
    }

    pub fn unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            outcome: QuoteOutcome::Unavailable {
                reason: reason.into(),
            },
        }
    }

    /// Price and source when resolved
    pub fn price(&self) -> Option<(f64, QuoteSource)> {
        match self.outcome {
            QuoteOutcome::Resolved { price, source } => Some((price, source)),
            QuoteOutcome::Unavailable { .. } => None,
        }
    }
}

// ============================================================================
// Price Tier
// ============================================================================

/// One step of a fallback chain.
#[async_trait]
pub trait PriceTier: Send + Sync {
    /// Source tag attached to prices from this tier
    fn source(&self) -> QuoteSource;

    /// Wait for upstream admission. Not counted against the tier timeout.
    async fn throttle(&self) {}

    /// Candidate price for `symbol`. `Ok(None)` means the tier had nothing.
    async fn fetch(&self, symbol: &str) -> Result<Option<f64>, ProviderError>;
}

/// Walk `tiers` in order and return the first valid price.
///
/// On exhaustion the error holds one line per tier describing why it was
/// skipped.
pub async fn first_valid_price(
    symbol: &str,
    tiers: &[Arc<dyn PriceTier>],
    tier_timeout: Duration,
) -> Result<(f64, QuoteSource), Vec<String>> {
    let mut failures = Vec::with_capacity(tiers.len());

    for tier in tiers {
        let source = tier.source();
        tier.throttle().await;

        let attempt = match tokio::time::timeout(tier_timeout, tier.fetch(symbol)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(tier_timeout.as_millis() as u64)),
        };

        match attempt {
            Ok(Some(price)) if is_valid_price(price) => {
                debug!(symbol, source = %source, price, "Price resolved");
                return Ok((price, source));
            }
            Ok(Some(price)) => {
                debug!(symbol, source = %source, price, "Tier returned unusable price");
                failures.push(format!("{}: invalid price {}", source, price));
            }
            Ok(None) => {
                debug!(symbol, source = %source, "Tier had no price");
                failures.push(format!("{}: no data", source));
            }
            Err(e) => {
                if e.is_recoverable() {
                    debug!(symbol, source = %source, error = %e, "Tier failed");
                } else {
                    warn!(symbol, source = %source, error = %e, "Tier failed");
                }
                failures.push(format!("{}: {}", source, e));
            }
        }
    }

    Err(failures)
}
