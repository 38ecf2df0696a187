//! Per-symbol quote resolution.
//!
//! Standard chain, in order:
//!
//! | Tier | Source             | Request                                   |
//! |------|--------------------|-------------------------------------------|
//! | 0    | `manual`           | none, the position's override             |
//! | 1    | `batch_intraday`   | cycle-wide batched 1m bars (prefetched)   |
//! | 2    | `intraday`         | single-symbol 1m bars, extended hours     |
//! | 3    | `daily_bar`        | latest regular-session daily close        |
//! | 4    | `last_quote`       | quote snapshot                            |

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::data::{last_close, BatchQuotes, ProviderError, QuoteProvider};
use crate::portfolio::Position;

use super::{first_valid_price, PriceTier, QuoteResult, QuoteSource};

/// Daily bars requested by the daily-bar tier
const DAILY_BAR_LOOKBACK: usize = 5;

// ============================================================================
// Tiers
// ============================================================================

/// Reads the snapshot prefetched once per cycle.
pub struct BatchTier {
    quotes: Arc<BatchQuotes>,
}

impl BatchTier {
    pub fn new(quotes: Arc<BatchQuotes>) -> Self {
        Self { quotes }
    }
}

#[async_trait]
impl PriceTier for BatchTier {
    fn source(&self) -> QuoteSource {
        QuoteSource::BatchIntraday
    }

    async fn fetch(&self, symbol: &str) -> Result<Option<f64>, ProviderError> {
        Ok(self.quotes.get(symbol))
    }
}

/// Last close of today's 1-minute bars for one symbol.
pub struct IntradayTier {
    provider: Arc<dyn QuoteProvider>,
}

impl IntradayTier {
    pub fn new(provider: Arc<dyn QuoteProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl PriceTier for IntradayTier {
    fn source(&self) -> QuoteSource {
        QuoteSource::Intraday
    }

    async fn throttle(&self) {
        self.provider.throttle().await;
    }

    async fn fetch(&self, symbol: &str) -> Result<Option<f64>, ProviderError> {
        let candles = self.provider.intraday_candles(symbol).await?;
        Ok(last_close(&candles))
    }
}

/// Most recent regular-session daily close.
pub struct DailyBarTier {
    provider: Arc<dyn QuoteProvider>,
}

impl DailyBarTier {
    pub fn new(provider: Arc<dyn QuoteProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl PriceTier for DailyBarTier {
    fn source(&self) -> QuoteSource {
        QuoteSource::DailyBar
    }

    async fn throttle(&self) {
        self.provider.throttle().await;
    }

    async fn fetch(&self, symbol: &str) -> Result<Option<f64>, ProviderError> {
        let candles = self.provider.daily_candles(symbol, DAILY_BAR_LOOKBACK).await?;
        Ok(last_close(&candles))
    }
}

/// Lightweight quote snapshot.
pub struct LastQuoteTier {
    provider: Arc<dyn QuoteProvider>,
}

impl LastQuoteTier {
    pub fn new(provider: Arc<dyn QuoteProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl PriceTier for LastQuoteTier {
    fn source(&self) -> QuoteSource {
        QuoteSource::LastQuote
    }

    async fn throttle(&self) {
        self.provider.throttle().await;
    }

    async fn fetch(&self, symbol: &str) -> Result<Option<f64>, ProviderError> {
        self.provider.last_price(symbol).await
    }
}

// ============================================================================
// Quote Resolver
// ============================================================================

/// Ordered chain of automated tiers. The manual override of a position is
/// consulted before any of them.
#[derive(Clone)]
pub struct QuoteResolver {
    tiers: Vec<Arc<dyn PriceTier>>,
    tier_timeout: Duration,
}

impl QuoteResolver {
    /// Empty chain; add tiers with [`QuoteResolver::with_tier`].
    pub fn new(tier_timeout: Duration) -> Self {
        Self {
            tiers: Vec::new(),
            tier_timeout,
        }
    }

    /// Append a tier to the end of the chain.
    pub fn with_tier(mut self, tier: impl PriceTier + 'static) -> Self {
        self.tiers.push(Arc::new(tier));
        self
    }

    /// Batch snapshot, then intraday, daily bar and last quote from `provider`.
    pub fn standard(
        provider: Arc<dyn QuoteProvider>,
        batch: Arc<BatchQuotes>,
        tier_timeout: Duration,
    ) -> Self {
        Self::new(tier_timeout)
            .with_tier(BatchTier::new(batch))
            .with_tier(IntradayTier::new(Arc::clone(&provider)))
            .with_tier(DailyBarTier::new(Arc::clone(&provider)))
            .with_tier(LastQuoteTier::new(provider))
    }

    /// Number of automated tiers
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Resolve the price of a position, honouring its manual override.
    pub async fn resolve(&self, position: &Position) -> QuoteResult {
        if let Some(price) = position.manual_override() {
            debug!(symbol = %position.ticker, price, "Using manual price");
            return QuoteResult::resolved(&position.ticker, price, QuoteSource::Manual);
        }

        self.resolve_symbol(&position.ticker).await
    }

    /// Resolve a symbol through the automated tiers only.
    pub async fn resolve_symbol(&self, symbol: &str) -> QuoteResult {
        match first_valid_price(symbol, &self.tiers, self.tier_timeout).await {
            Ok((price, source)) => QuoteResult::resolved(symbol, price, source),
            Err(failures) => {
                warn!(symbol, tiers = failures.len(), "No tier produced a price");
                let reason = if failures.is_empty() {
                    "no price tiers configured".to_string()
                } else {
                    failures.join("; ")
                };
                QuoteResult::unavailable(symbol, reason)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
