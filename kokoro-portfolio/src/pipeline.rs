//! One valuation cycle.
//!
//! ```text
//!            ┌─ batch prefetch (all auto-priced symbols) ─┐
//! portfolio ─┤                                            ├─> per-position tasks ─> totals
//!            └─ FX resolution ────────────────────────────┘    (buffered, ordered)
//! ```
//!
//! Each position resolves its price and history independently; a failure is
//! confined to its own row. Rows are yielded in portfolio order however the
//! tasks complete.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use kokoro_common::config::Config;
use kokoro_common::logging::generate_cycle_id;

use crate::data::{closes, BatchQuotes, ProviderError, QuoteProvider};
use crate::portfolio::{Portfolio, Position};
use crate::quote::{ExchangeRate, FxResolver, QuoteOutcome, QuoteResolver};
use crate::signal::{self, NEUTRAL_RSI, RSI_WINDOW};
use crate::valuation::{PortfolioTotals, RowResult, ValuationRow};

/// Pipeline failures. A completed cycle never fails; only cancellation
/// prevents a report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Valuation cycle cancelled")]
    Cancelled,
}

/// Result of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// One entry per live position, in portfolio order
    pub rows: Vec<RowResult>,
    pub totals: PortfolioTotals,
    pub exchange_rate: ExchangeRate,
    pub as_of: DateTime<Utc>,
}

impl PipelineReport {
    /// Priced rows only
    pub fn priced_rows(&self) -> impl Iterator<Item = &ValuationRow> {
        self.rows.iter().filter_map(RowResult::priced)
    }
}

/// Bounded-parallel valuation of a portfolio.
pub struct Pipeline {
    provider: Arc<dyn QuoteProvider>,
    fx: FxResolver,
    max_concurrency: usize,
    tier_timeout: Duration,
    history_days: usize,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        fx: FxResolver,
        max_concurrency: usize,
        tier_timeout: Duration,
        history_days: usize,
    ) -> Self {
        Self {
            provider,
            fx,
            max_concurrency: max_concurrency.max(1),
            tier_timeout,
            history_days,
        }
    }

    /// Create from config
    pub fn from_config(provider: Arc<dyn QuoteProvider>, config: &Config) -> Self {
        let tier_timeout = Duration::from_millis(config.quotes.tier_timeout_ms);
        let fx = FxResolver::from_config(Arc::clone(&provider), &config.fx, tier_timeout);

        Self::new(
            provider,
            fx,
            config.pipeline.max_concurrency,
            tier_timeout,
            config.quotes.history_days,
        )
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Value every live position of `portfolio`.
    pub async fn run(&self, portfolio: &Portfolio) -> PipelineReport {
        let cycle_id = generate_cycle_id();
        let positions: Vec<Position> = portfolio.live_positions().cloned().collect();

        info!(
            cycle_id = %cycle_id,
            positions = positions.len(),
            max_concurrency = self.max_concurrency,
            "Starting valuation cycle"
        );

        let symbols = auto_priced_symbols(&positions);
        let (batch, exchange_rate) =
            tokio::join!(self.prefetch_batch(&symbols, &cycle_id), self.fx.resolve());

        let resolver = QuoteResolver::standard(
            Arc::clone(&self.provider),
            Arc::new(batch),
            self.tier_timeout,
        );

        let resolver = &resolver;
        let cycle = cycle_id.as_str();
        let rate = exchange_rate.rate;

        let rows: Vec<RowResult> = stream::iter(positions)
            .map(|position| async move {
                self.value_position(&position, resolver, rate, cycle).await
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let totals = PortfolioTotals::aggregate(&rows, exchange_rate.rate);

        info!(
            cycle_id = %cycle_id,
            priced = totals.priced,
            unavailable = totals.unavailable.len(),
            rate = exchange_rate.rate,
            rate_source = %exchange_rate.source,
            "Valuation cycle complete"
        );

        PipelineReport {
            rows,
            totals,
            exchange_rate,
            as_of: Utc::now(),
        }
    }

    /// Run a cycle unless `cancel` completes first. On cancellation every
    /// in-flight request is dropped and no partial report is returned.
    pub async fn run_until<F>(
        &self,
        portfolio: &Portfolio,
        cancel: F,
    ) -> Result<PipelineReport, PipelineError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            report = self.run(portfolio) => Ok(report),
            _ = cancel => {
                warn!("Valuation cycle cancelled");
                Err(PipelineError::Cancelled)
            }
        }
    }

    /// One batched request for every symbol that needs an automated price.
    /// Failure leaves the snapshot empty and the per-symbol tiers take over.
    async fn prefetch_batch(&self, symbols: &[String], cycle_id: &str) -> BatchQuotes {
        if symbols.is_empty() {
            return BatchQuotes::new();
        }

        self.provider.throttle().await;
        let fetch = self.provider.batch_intraday(symbols);
        let result = match tokio::time::timeout(self.tier_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.tier_timeout.as_millis() as u64)),
        };

        match result {
            Ok(quotes) => {
                debug!(
                    cycle_id = %cycle_id,
                    requested = symbols.len(),
                    received = quotes.len(),
                    "Batch prefetch complete"
                );
                quotes
            }
            Err(e) => {
                warn!(cycle_id = %cycle_id, error = %e, "Batch prefetch failed, falling back per symbol");
                BatchQuotes::new()
            }
        }
    }

    /// Daily closes for the RSI window.
    async fn history(&self, symbol: &str) -> Result<Vec<f64>, ProviderError> {
        self.provider.throttle().await;
        let fetch = self.provider.daily_candles(symbol, self.history_days);
        match tokio::time::timeout(self.tier_timeout, fetch).await {
            Ok(result) => result.map(|candles| closes(&candles)),
            Err(_) => Err(ProviderError::Timeout(self.tier_timeout.as_millis() as u64)),
        }
    }

    async fn value_position(
        &self,
        position: &Position,
        resolver: &QuoteResolver,
        exchange_rate: f64,
        cycle_id: &str,
    ) -> RowResult {
        let (quote, history) = tokio::join!(resolver.resolve(position), self.history(&position.ticker));

        let (price, source) = match quote.outcome {
            QuoteOutcome::Resolved { price, source } => (price, source),
            QuoteOutcome::Unavailable { reason } => {
                warn!(cycle_id = %cycle_id, symbol = %position.ticker, "Price unavailable");
                return RowResult::Unavailable {
                    symbol: position.ticker.clone(),
                    reason,
                };
            }
        };

        let rsi = match history {
            Ok(closes) => signal::rsi(&closes, RSI_WINDOW),
            Err(e) => {
                debug!(
                    cycle_id = %cycle_id,
                    symbol = %position.ticker,
                    error = %e,
                    "History unavailable, using neutral RSI"
                );
                NEUTRAL_RSI
            }
        };

        RowResult::Priced(ValuationRow::compute(position, price, source, rsi, exchange_rate))
    }
}

/// Distinct symbols without a manual override, in first-seen order.
fn auto_priced_symbols(positions: &[Position]) -> Vec<String> {
    let mut seen = HashSet::new();
    positions
        .iter()
        .filter(|p| p.manual_override().is_none())
        .filter(|p| seen.insert(p.ticker.clone()))
        .map(|p| p.ticker.clone())
        .collect()
}
