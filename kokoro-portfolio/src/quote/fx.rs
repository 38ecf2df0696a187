//! USD/JPY rate resolution.
//!
//! Uses the intraday, daily-bar and last-quote tiers on the configured pair
//! symbol. When all of them fail the configured default is returned so a
//! cycle always has a positive rate to convert with.

use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use kokoro_common::config::FxConfig;

use crate::data::QuoteProvider;

use super::{first_valid_price, is_valid_price, PriceTier, QuoteSource};
use super::resolver::{DailyBarTier, IntradayTier, LastQuoteTier};

/// Where a rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    /// A quote tier answered
    Quote(QuoteSource),
    /// Every tier failed; configured constant
    Default,
}

impl std::fmt::Display for RateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quote(source) => write!(f, "{}", source),
            Self::Default => write!(f, "default"),
        }
    }
}

impl Serialize for RateSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// JPY per USD for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExchangeRate {
    pub rate: f64,
    pub source: RateSource,
}

impl ExchangeRate {
    pub fn is_default(&self) -> bool {
        self.source == RateSource::Default
    }
}

/// Resolves the exchange rate with a constant fallback.
#[derive(Clone)]
pub struct FxResolver {
    pair: String,
    default_rate: f64,
    tiers: Vec<Arc<dyn PriceTier>>,
    tier_timeout: Duration,
}

impl FxResolver {
    /// Intraday, daily bar and last quote for `pair` from `provider`.
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        pair: impl Into<String>,
        default_rate: f64,
        tier_timeout: Duration,
    ) -> Self {
        let tiers: Vec<Arc<dyn PriceTier>> = vec![
            Arc::new(IntradayTier::new(Arc::clone(&provider))),
            Arc::new(DailyBarTier::new(Arc::clone(&provider))),
            Arc::new(LastQuoteTier::new(provider)),
        ];

        Self {
            pair: pair.into(),
            default_rate,
            tiers,
            tier_timeout,
        }
    }

    /// Create from config
    pub fn from_config(
        provider: Arc<dyn QuoteProvider>,
        config: &FxConfig,
        tier_timeout: Duration,
    ) -> Self {
        Self::new(provider, config.pair.clone(), config.default_rate, tier_timeout)
    }

    /// Pair symbol, e.g. `USDJPY=X`
    pub fn pair(&self) -> &str {
        &self.pair
    }

    /// Current rate, or the default when no tier answers.
    pub async fn resolve(&self) -> ExchangeRate {
        match first_valid_price(&self.pair, &self.tiers, self.tier_timeout).await {
            Ok((rate, source)) => {
                info!(pair = %self.pair, rate, source = %source, "Exchange rate resolved");
                ExchangeRate {
                    rate,
                    source: RateSource::Quote(source),
                }
            }
            Err(failures) => {
                warn!(
                    pair = %self.pair,
                    default_rate = self.default_rate,
                    failures = %failures.join("; "),
                    "Exchange rate unavailable, using default"
                );
                self.fallback()
            }
        }
    }

    /// The configured default, or the built-in constant when the configured
    /// one is unusable.
    fn fallback(&self) -> ExchangeRate {
        let rate = if is_valid_price(self.default_rate) {
            self.default_rate
        } else {
            kokoro_common::config::DEFAULT_FX_RATE
        };

        ExchangeRate {
            rate,
            source: RateSource::Default,
        }
    }
}
