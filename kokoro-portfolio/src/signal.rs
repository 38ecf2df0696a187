//! Momentum signal.
//!
//! A 14-period RSI over daily closes mapped to BUY / SELL / HOLD. The mean of
//! gains and losses is a plain average over the last `window` differences,
//! not Wilder's smoothing.

use serde::{Deserialize, Serialize};

/// Look-back window in price differences
pub const RSI_WINDOW: usize = 14;

/// RSI strictly below this is oversold
pub const BUY_THRESHOLD: f64 = 35.0;

/// RSI strictly above this is overbought
pub const SELL_THRESHOLD: f64 = 65.0;

/// Value reported when there is not enough history
pub const NEUTRAL_RSI: f64 = 50.0;

/// Trading signal derived from RSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Map an RSI value to a signal.
    pub fn from_rsi(rsi: f64) -> Self {
        if rsi < BUY_THRESHOLD {
            Self::Buy
        } else if rsi > SELL_THRESHOLD {
            Self::Sell
        } else {
            Self::Hold
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Relative strength index in `[0, 100]`.
///
/// Non-finite closes are skipped. Fewer than `window + 1` usable closes give
/// the neutral 50. A window without losses gives 100, flat history included.
pub fn rsi(closes: &[f64], window: usize) -> f64 {
    let data: Vec<f64> = closes.iter().copied().filter(|c| c.is_finite()).collect();

    if window == 0 || data.len() < window + 1 {
        return NEUTRAL_RSI;
    }

    let changes: Vec<f64> = data.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &changes[changes.len() - window..];

    let gains: f64 = recent.iter().filter(|&&c| c > 0.0).sum();
    let losses: f64 = recent.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum();

    let avg_gain = gains / window as f64;
    let avg_loss = losses / window as f64;

    if avg_loss <= 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// RSI and signal for a close series, using the standard window.
pub fn evaluate(closes: &[f64]) -> (f64, Signal) {
    let value = rsi(closes, RSI_WINDOW);
    (value, Signal::from_rsi(value))
}
