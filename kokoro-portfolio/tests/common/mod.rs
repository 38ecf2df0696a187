//! Scripted quote provider shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use kokoro_portfolio::data::{BatchQuotes, Candle, ProviderError, QuoteProvider, Timeframe};
use kokoro_portfolio::quote::FxResolver;

/// Canned answer for one symbol and endpoint.
#[derive(Clone)]
pub enum Script {
    /// Closes, oldest first
    Series(Vec<f64>),
    Fail(ProviderError),
    /// Never answers
    Hang,
}

/// Provider whose answers are fixed per symbol. Unscripted symbols fail
/// with `DataNotAvailable`.
#[derive(Default)]
pub struct ScriptedProvider {
    batch: Option<Vec<(String, f64)>>,
    batch_hangs: bool,
    intraday: HashMap<String, Script>,
    daily: HashMap<String, Script>,
    last: HashMap<String, Script>,
    delays: HashMap<String, Duration>,
    pub batch_calls: AtomicU32,
    pub intraday_calls: AtomicU32,
    pub daily_calls: AtomicU32,
    pub last_calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch(mut self, prices: &[(&str, f64)]) -> Self {
        self.batch = Some(prices.iter().map(|(s, p)| (s.to_string(), *p)).collect());
        self
    }

    pub fn with_hanging_batch(mut self) -> Self {
        self.batch_hangs = true;
        self
    }

    pub fn with_intraday(mut self, symbol: &str, script: Script) -> Self {
        self.intraday.insert(symbol.to_string(), script);
        self
    }

    pub fn with_daily(mut self, symbol: &str, script: Script) -> Self {
        self.daily.insert(symbol.to_string(), script);
        self
    }

    pub fn with_last(mut self, symbol: &str, script: Script) -> Self {
        self.last.insert(symbol.to_string(), script);
        self
    }

    /// Delay every answer for `symbol`.
    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn total_calls(&self) -> u32 {
        self.batch_calls.load(Ordering::SeqCst)
            + self.intraday_calls.load(Ordering::SeqCst)
            + self.daily_calls.load(Ordering::SeqCst)
            + self.last_calls.load(Ordering::SeqCst)
    }

    async fn answer(
        &self,
        scripts: &HashMap<String, Script>,
        symbol: &str,
    ) -> Result<Vec<f64>, ProviderError> {
        if let Some(delay) = self.delays.get(symbol) {
            tokio::time::sleep(*delay).await;
        }

        match scripts.get(symbol) {
            Some(Script::Series(closes)) => Ok(closes.clone()),
            Some(Script::Fail(e)) => Err(e.clone()),
            Some(Script::Hang) => std::future::pending().await,
            None => Err(ProviderError::DataNotAvailable(format!("no script for {}", symbol))),
        }
    }
}

pub fn candles(symbol: &str, timeframe: Timeframe, closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            symbol: symbol.to_string(),
            timeframe,
            timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        })
        .collect()
}

#[async_trait]
impl QuoteProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn batch_intraday(&self, symbols: &[String]) -> Result<BatchQuotes, ProviderError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        if self.batch_hangs {
            return std::future::pending().await;
        }

        match &self.batch {
            Some(prices) => Ok(prices
                .iter()
                .filter(|(s, _)| symbols.contains(s))
                .cloned()
                .collect()),
            None => Err(ProviderError::Unavailable("batch endpoint down".into())),
        }
    }

    async fn intraday_candles(&self, symbol: &str) -> Result<Vec<Candle>, ProviderError> {
        self.intraday_calls.fetch_add(1, Ordering::SeqCst);
        let closes = self.answer(&self.intraday, symbol).await?;
        Ok(candles(symbol, Timeframe::M1, &closes))
    }

    async fn daily_candles(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>, ProviderError> {
        self.daily_calls.fetch_add(1, Ordering::SeqCst);
        let closes = self.answer(&self.daily, symbol).await?;
        let start = closes.len().saturating_sub(limit);
        Ok(candles(symbol, Timeframe::Daily, &closes[start..]))
    }

    async fn last_price(&self, symbol: &str) -> Result<Option<f64>, ProviderError> {
        self.last_calls.fetch_add(1, Ordering::SeqCst);
        let closes = self.answer(&self.last, symbol).await?;
        Ok(closes.last().copied())
    }
}

/// Tier timeout used by tests that do not exercise timeouts.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(500);

pub fn fx_resolver(provider: Arc<ScriptedProvider>) -> FxResolver {
    FxResolver::new(provider, "USDJPY=X", 150.0, TEST_TIMEOUT)
}

/// `n` strictly increasing closes ending at `last`.
pub fn rising(n: usize, last: f64) -> Vec<f64> {
    (0..n).map(|i| last - (n - 1 - i) as f64 * 0.1).collect()
}
