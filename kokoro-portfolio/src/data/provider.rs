//! Quote provider abstraction.
//!
//! Defines the `QuoteProvider` trait that upstream quote sources implement.
//! Every method may fail; callers treat all failures as transient and move on
//! to the next fallback tier.

use async_trait::async_trait;
use std::fmt;

use super::{BatchQuotes, Candle};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to quote providers.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Access refused upstream (invalid crumb, blocked client)
    Auth(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// No data for the requested symbol/interval (empty payload, delisted)
    DataNotAvailable(String),
    /// Provider is temporarily unavailable
    Unavailable(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Unexpected payload or internal provider error
    Internal(String),
    /// The tier did not answer within its time budget
    Timeout(u64),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Auth(msg) => write!(f, "Access refused: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
            Self::Timeout(ms) => write!(f, "Timed out after {} ms", ms),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is likely to clear on its own (worth retrying later)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_) | Self::Timeout(_)
        )
    }

    /// Map a `reqwest` transport error.
    pub fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network("Request timeout".into())
        } else if e.is_connect() {
            Self::Network("Connection failed".into())
        } else {
            Self::Network(e.to_string())
        }
    }
}

// ============================================================================
// Quote Provider Trait
// ============================================================================

/// Upstream quote source.
///
/// Implementations must not retry internally: the resolver owns the fallback
/// policy and the time budget of every call.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Provider name (e.g., "yahoo")
    fn name(&self) -> &'static str;

    /// Wait until one more request may be issued.
    ///
    /// Callers await this before starting the timed part of a call, so local
    /// queueing never counts against an upstream time budget. The data
    /// methods below do not throttle on their own.
    async fn throttle(&self) {}

    /// Lightweight reachability check.
    async fn health_check(&self) -> Result<(), ProviderError>;

    /// Latest 1-minute close, including extended hours, for several symbols
    /// in one request. Symbols missing from the response are simply absent
    /// from the map.
    async fn batch_intraday(&self, symbols: &[String]) -> Result<BatchQuotes, ProviderError>;

    /// Today's 1-minute bars for one symbol, including extended hours.
    async fn intraday_candles(&self, symbol: &str) -> Result<Vec<Candle>, ProviderError>;

    /// Most recent regular-session daily bars, oldest first.
    ///
    /// * `limit` - maximum number of bars to return (latest kept)
    async fn daily_candles(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>, ProviderError>;

    /// Lightweight last-trade price snapshot.
    async fn last_price(&self, symbol: &str) -> Result<Option<f64>, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================
