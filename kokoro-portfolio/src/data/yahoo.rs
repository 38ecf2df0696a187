//! Yahoo Finance chart API adapter.
//!
//! # Endpoints
//! - `/v8/finance/chart/{symbol}`: minute or daily bars, `includePrePost`
//!   for extended hours
//! - `/v7/finance/spark`: the same close series for several symbols at once
//! - `/v7/finance/quote`: lightweight price snapshot
//!
//! # Reliability
//! The endpoints are unofficial. They intermittently answer 401/403 to
//! clients they consider automated, return 429 under load, and return
//! `result: null` for symbols they do not know. All of those map to a
//! `ProviderError` and none of them is retried here.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use kokoro_common::config::QuotesConfig;

use super::provider::{ProviderError, QuoteProvider};
use super::rate_limiter::{shared_limiter, SharedRateLimiter};
use super::{BatchQuotes, Candle, Timeframe};

// ============================================================================
// Constants
// ============================================================================

const CHART_ENDPOINT: &str = "/v8/finance/chart";
const SPARK_ENDPOINT: &str = "/v7/finance/spark";
const QUOTE_ENDPOINT: &str = "/v7/finance/quote";

/// Symbol used by the health check
const HEALTH_CHECK_SYMBOL: &str = "SPY";

/// Retry hint attached to 429 responses
const RATE_LIMIT_RETRY_SECS: u64 = 5;

/// Pick a chart `range` that covers `limit` daily bars.
fn daily_range(limit: usize) -> &'static str {
    match limit {
        0..=20 => "1mo",
        21..=60 => "3mo",
        61..=120 => "6mo",
        121..=250 => "1y",
        _ => "2y",
    }
}

// ============================================================================
// Yahoo Adapter
// ============================================================================

/// Quote provider backed by the Yahoo Finance JSON endpoints.
pub struct YahooAdapter {
    base_url: String,
    client: reqwest::Client,
    rate_limiter: SharedRateLimiter,
}

impl YahooAdapter {
    /// Create an adapter against `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        http_timeout: Duration,
        rate_limit_rpm: u32,
        user_agent: &str,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            rate_limiter: shared_limiter("yahoo", rate_limit_rpm),
        }
    }

    /// Create from config
    pub fn from_config(config: &QuotesConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.http_timeout_secs),
            config.rate_limit_rpm,
            &config.user_agent,
        )
    }

    /// Issue a GET and decode the JSON body, mapping HTTP failures.
    /// The rate-limit token is taken by the caller through `throttle`.
    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Fetching from Yahoo");

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth(format!("HTTP {}", status)));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::DataNotAvailable(format!("HTTP 404 for {}", path)));
        }

        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))
    }

    /// Fetch chart bars for one symbol.
    async fn fetch_chart(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        range: &str,
        include_extended: bool,
    ) -> Result<Vec<Candle>, ProviderError> {
        let path = format!("{}/{}", CHART_ENDPOINT, symbol);
        let query = [
            ("interval", timeframe.to_api_interval().to_string()),
            ("range", range.to_string()),
            ("includePrePost", include_extended.to_string()),
        ];

        let payload: ChartResponse = self.get_json(&path, &query).await?;

        if let Some(err) = payload.chart.error {
            return Err(ProviderError::DataNotAvailable(err.describe()));
        }

        let result = payload
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("Empty chart for {}", symbol)))?;

        Ok(result.into_candles(symbol, timeframe))
    }
}

// ============================================================================
// QuoteProvider Implementation
// ============================================================================

#[async_trait]
impl QuoteProvider for YahooAdapter {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn throttle(&self) {
        self.rate_limiter.acquire().await;
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.throttle().await;
        let candles = self.daily_candles(HEALTH_CHECK_SYMBOL, 1).await?;

        if candles.is_empty() {
            return Err(ProviderError::Unavailable(
                "Health check returned no data".into(),
            ));
        }

        Ok(())
    }

    async fn batch_intraday(&self, symbols: &[String]) -> Result<BatchQuotes, ProviderError> {
        if symbols.is_empty() {
            return Ok(BatchQuotes::new());
        }

        let query = [
            ("symbols", symbols.join(",")),
            ("interval", Timeframe::M1.to_api_interval().to_string()),
            ("range", "1d".to_string()),
            ("includePrePost", "true".to_string()),
        ];

        let payload: SparkPayload = self.get_json(SPARK_ENDPOINT, &query).await?;
        let quotes = payload.into_batch_quotes();

        if quotes.is_empty() {
            return Err(ProviderError::DataNotAvailable(
                "Batch response carried no prices".into(),
            ));
        }

        debug!(requested = symbols.len(), received = quotes.len(), "Batch intraday fetched");
        Ok(quotes)
    }

    async fn intraday_candles(&self, symbol: &str) -> Result<Vec<Candle>, ProviderError> {
        self.fetch_chart(symbol, Timeframe::M1, "1d", true).await
    }

    async fn daily_candles(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>, ProviderError> {
        let mut candles = self
            .fetch_chart(symbol, Timeframe::Daily, daily_range(limit), false)
            .await?;

        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }

        Ok(candles)
    }

    async fn last_price(&self, symbol: &str) -> Result<Option<f64>, ProviderError> {
        let query = [("symbols", symbol.to_string())];
        let payload: QuoteEnvelope = self.get_json(QUOTE_ENDPOINT, &query).await?;

        let quote = payload
            .quote_response
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|q| q.symbol.eq_ignore_ascii_case(symbol));

        Ok(quote.and_then(|q| q.best_price()))
    }
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl ApiError {
    fn describe(&self) -> String {
        match (&self.code, &self.description) {
            (Some(code), Some(desc)) => format!("{}: {}", code, desc),
            (Some(code), None) => code.clone(),
            (None, Some(desc)) => desc.clone(),
            (None, None) => "unknown upstream error".into(),
        }
    }
}

/// One chart series. Price arrays are index-aligned with `timestamp` and may
/// contain nulls for minutes without trades.
#[derive(Debug, Default, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn value_at(series: &[Option<f64>], i: usize) -> Option<f64> {
    series.get(i).copied().flatten().filter(|v| v.is_finite())
}

impl ChartResult {
    /// Build candles, dropping bars whose close is null.
    fn into_candles(self, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        let series = self
            .indicators
            .and_then(|i| i.quote.into_iter().next())
            .unwrap_or_default();

        let mut candles: Vec<Candle> = self
            .timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, &ts)| {
                let close = value_at(&series.close, i)?;
                let timestamp = Utc.timestamp_opt(ts, 0).single()?;
                Some(Candle {
                    symbol: symbol.to_string(),
                    timeframe,
                    timestamp,
                    open: value_at(&series.open, i).unwrap_or(close),
                    high: value_at(&series.high, i).unwrap_or(close),
                    low: value_at(&series.low, i).unwrap_or(close),
                    close,
                    volume: value_at(&series.volume, i).unwrap_or(0.0),
                })
            })
            .collect();

        candles.sort_by_key(|c| c.timestamp);
        candles
    }

    /// Last non-null close of the series.
    fn last_close(&self) -> Option<f64> {
        self.indicators
            .as_ref()
            .and_then(|i| i.quote.first())
            .and_then(|q| q.close.iter().rev().find_map(|c| c.filter(|v| v.is_finite())))
    }
}

/// A JSON value that is a list when several items are present and a bare
/// object when there is exactly one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

/// Batched spark response.
///
/// Two shapes reach us: the wrapped envelope
/// (`{"spark": {"result": [{"symbol", "response": [chart]}]}}`, where
/// `result` degrades to a bare object for a single symbol) and the flat
/// per-symbol map (`{"RKLB": {"close": [...]}, ...}`). Both are normalized to
/// `BatchQuotes` here so callers never see the difference.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SparkPayload {
    Wrapped { spark: SparkEnvelope },
    Flat(HashMap<String, FlatSpark>),
}

#[derive(Debug, Deserialize)]
struct SparkEnvelope {
    #[serde(default)]
    result: Option<OneOrMany<SparkResult>>,
}

#[derive(Debug, Deserialize)]
struct SparkResult {
    symbol: String,
    #[serde(default)]
    response: Option<OneOrMany<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct FlatSpark {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    close: Option<Vec<Option<f64>>>,
}

impl SparkPayload {
    fn into_batch_quotes(self) -> BatchQuotes {
        let mut quotes = BatchQuotes::new();

        match self {
            Self::Wrapped { spark } => {
                let results = spark.result.map(OneOrMany::into_vec).unwrap_or_default();
                for result in results {
                    let charts = result.response.map(OneOrMany::into_vec).unwrap_or_default();
                    // The chart meta symbol wins over the outer key when present
                    for chart in charts {
                        let symbol = chart
                            .meta
                            .as_ref()
                            .and_then(|m| m.symbol.clone())
                            .unwrap_or_else(|| result.symbol.clone());
                        if let Some(price) = chart.last_close() {
                            quotes.insert(&symbol, price);
                        }
                    }
                }
            }
            Self::Flat(map) => {
                for (key, series) in map {
                    let symbol = series.symbol.unwrap_or(key);
                    let last = series
                        .close
                        .unwrap_or_default()
                        .into_iter()
                        .rev()
                        .find_map(|c| c.filter(|v| v.is_finite()));
                    if let Some(price) = last {
                        quotes.insert(&symbol, price);
                    }
                }
            }
        }

        quotes
    }
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Option<Vec<QuoteSnapshot>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSnapshot {
    symbol: String,
    #[serde(default)]
    market_state: Option<String>,
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    pre_market_price: Option<f64>,
    #[serde(default)]
    post_market_price: Option<f64>,
}

impl QuoteSnapshot {
    /// Extended-hours price while that session is the current one, else the
    /// regular market price.
    fn best_price(&self) -> Option<f64> {
        let valid = |p: Option<f64>| p.filter(|v| v.is_finite() && *v > 0.0);
        let state = self.market_state.as_deref().unwrap_or("").to_uppercase();

        let extended = if state.starts_with("PRE") {
            valid(self.pre_market_price)
        } else if state.starts_with("POST") || state == "CLOSED" {
            valid(self.post_market_price)
        } else {
            None
        };

        extended.or_else(|| valid(self.regular_market_price))
    }
}

// ============================================================================
// Tests
// ============================================================================
