//! Per-position P/L and portfolio totals.
//!
//! Every USD figure is converted to JPY with the same cycle-wide rate and
//! rounded half away from zero to whole yen.

use serde::{Deserialize, Serialize};

use crate::portfolio::Position;
use crate::quote::QuoteSource;
use crate::signal::Signal;

/// Target price as a fraction of the current price
pub const TARGET_DISCOUNT: f64 = 0.95;

/// Convert a USD amount to whole yen.
pub fn to_jpy(usd: f64, rate: f64) -> i64 {
    (usd * rate).round() as i64
}

/// P/L as a percentage of cost basis; zero when there is no cost basis.
pub fn pl_percent(pl_usd: f64, cost_basis: f64) -> f64 {
    if cost_basis > 0.0 {
        pl_usd / cost_basis * 100.0
    } else {
        0.0
    }
}

/// One priced line of the valuation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRow {
    pub symbol: String,
    pub price: f64,
    pub source: QuoteSource,
    pub target_price: f64,
    pub rsi: f64,
    pub signal: Signal,
    pub shares: f64,
    pub avg_price: f64,
    pub market_value: f64,
    pub cost_basis: f64,
    pub pl_usd: f64,
    pub pl_pct: f64,
    pub value_jpy: i64,
}

impl ValuationRow {
    /// Value a position at `price`.
    pub fn compute(
        position: &Position,
        price: f64,
        source: QuoteSource,
        rsi: f64,
        exchange_rate: f64,
    ) -> Self {
        let market_value = price * position.shares;
        let cost_basis = position.cost_basis();
        let pl_usd = market_value - cost_basis;

        Self {
            symbol: position.ticker.clone(),
            price,
            source,
            target_price: price * TARGET_DISCOUNT,
            rsi,
            signal: Signal::from_rsi(rsi),
            shares: position.shares,
            avg_price: position.avg_price,
            market_value,
            cost_basis,
            pl_usd,
            pl_pct: pl_percent(pl_usd, cost_basis),
            value_jpy: to_jpy(market_value, exchange_rate),
        }
    }
}

/// Outcome for one live position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowResult {
    Priced(ValuationRow),
    /// No tier produced a usable price
    Unavailable { symbol: String, reason: String },
}

impl RowResult {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Priced(row) => &row.symbol,
            Self::Unavailable { symbol, .. } => symbol,
        }
    }

    pub fn is_priced(&self) -> bool {
        matches!(self, Self::Priced(_))
    }

    pub fn priced(&self) -> Option<&ValuationRow> {
        match self {
            Self::Priced(row) => Some(row),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Portfolio-wide sums over priced rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioTotals {
    pub market_value_usd: f64,
    pub pl_usd: f64,
    pub cost_basis_usd: f64,
    pub market_value_jpy: i64,
    pub pl_jpy: i64,
    /// Number of priced rows
    pub priced: usize,
    /// Symbols without a price, in row order
    pub unavailable: Vec<String>,
}

impl PortfolioTotals {
    /// Fold row results. Unavailable rows never count as zero-valued
    /// holdings; they are only listed.
    pub fn aggregate(rows: &[RowResult], exchange_rate: f64) -> Self {
        let mut totals = rows.iter().fold(Self::default(), |mut acc, row| {
            match row {
                RowResult::Priced(r) => {
                    acc.market_value_usd += r.market_value;
                    acc.cost_basis_usd += r.cost_basis;
                    acc.pl_usd += r.pl_usd;
                    acc.priced += 1;
                }
                RowResult::Unavailable { symbol, .. } => acc.unavailable.push(symbol.clone()),
            }
            acc
        });

        totals.market_value_jpy = to_jpy(totals.market_value_usd, exchange_rate);
        totals.pl_jpy = to_jpy(totals.pl_usd, exchange_rate);
        totals
    }

    /// Portfolio P/L percentage against total cost basis.
    pub fn pl_pct(&self) -> f64 {
        pl_percent(self.pl_usd, self.cost_basis_usd)
    }
}
