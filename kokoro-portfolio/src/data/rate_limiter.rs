//! Token bucket rate limiter for upstream request throttling.
//!
//! The quote endpoints start refusing clients that burst, so every adapter
//! request takes a token first. One limiter is shared by all concurrent
//! symbol resolutions of an adapter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// A token bucket rate limiter.
///
/// Holds up to one second worth of tokens, refilled continuously at
/// `requests_per_minute / 60_000` tokens per millisecond.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum tokens in the bucket
    capacity: u32,
    /// Current available tokens (scaled by 1000 for precision)
    tokens: AtomicU64,
    /// Tokens added per millisecond (unscaled)
    refill_rate_per_ms: f64,
    /// Last refill timestamp
    last_refill: Mutex<Instant>,
    /// Name for logging
    name: String,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `name` - Name for logging purposes
    /// * `requests_per_minute` - Maximum requests allowed per minute
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        let requests_per_second = (requests_per_minute as f64 / 60.0).ceil() as u32;
        let capacity = requests_per_second.max(1);
        let refill_rate_per_ms = requests_per_minute.max(1) as f64 / 60_000.0;

        Self {
            capacity,
            tokens: AtomicU64::new((capacity as u64) * 1000),
            refill_rate_per_ms,
            last_refill: Mutex::new(Instant::now()),
            name: name.into(),
        }
    }

    /// Acquire a token, waiting if necessary.
    ///
    /// Awaited before a call's time budget starts. A waiting acquire is
    /// cancelled by dropping the future.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }

            let wait_ms = (1.0 / self.refill_rate_per_ms).ceil() as u64;
            let wait_time = Duration::from_millis(wait_ms.clamp(10, 1000));

            debug!(
                limiter = %self.name,
                wait_ms = wait_time.as_millis() as u64,
                "Rate limited, waiting for token"
            );

            tokio::time::sleep(wait_time).await;
        }
    }

    /// Try to acquire a token without waiting.
    pub fn try_acquire(&self) -> bool {
        self.refill();

        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            if current < 1000 {
                return false;
            }

            if self
                .tokens
                .compare_exchange_weak(current, current - 1000, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&self) {
        // try_lock: a concurrent refill already covers this instant
        if let Ok(mut last_refill) = self.last_refill.try_lock() {
            let now = Instant::now();
            let elapsed_ms = now.duration_since(*last_refill).as_millis() as f64;
            let new_tokens = (elapsed_ms * self.refill_rate_per_ms * 1000.0) as u64;

            if new_tokens > 0 {
                let max_tokens = (self.capacity as u64) * 1000;
                let _ = self
                    .tokens
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                        Some((current + new_tokens).min(max_tokens))
                    });
                *last_refill = now;
            }
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Shared rate limiter that can be cloned.
pub type SharedRateLimiter = Arc<RateLimiter>;

/// Create a shared rate limiter.
pub fn shared_limiter(name: impl Into<String>, requests_per_minute: u32) -> SharedRateLimiter {
    Arc::new(RateLimiter::new(name, requests_per_minute))
}

// ============================================================================
// Tests
// ============================================================================
