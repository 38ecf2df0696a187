//! Portfolio model.
//!
//! A portfolio is an ordered list of positions. Duplicate tickers are kept as
//! separate line items; only `aligned_to` collapses them (last row wins).

use serde::{Deserialize, Serialize};

/// A single holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Upper-cased, trimmed symbol
    pub ticker: String,
    /// Cost basis per share
    #[serde(default)]
    pub avg_price: f64,
    /// Shares held (may be fractional)
    #[serde(default)]
    pub shares: f64,
    /// User-entered price that overrides every automated quote tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_price: Option<f64>,
}

/// Clamp a numeric field to the non-negative finite range.
fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Normalize a raw symbol: trimmed and upper-cased.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_uppercase()
}

impl Position {
    /// Create a position, normalizing the ticker and clamping amounts.
    pub fn new(ticker: &str, avg_price: f64, shares: f64) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            avg_price: non_negative(avg_price),
            shares: non_negative(shares),
            manual_price: None,
        }
    }

    /// Attach a manual price override. Zero or invalid values clear it.
    pub fn with_manual_price(mut self, price: f64) -> Self {
        self.manual_price = Some(price).filter(|p| p.is_finite() && *p > 0.0);
        self
    }

    /// Empty placeholder for a symbol without recorded holdings.
    pub fn untracked(ticker: &str) -> Self {
        Self::new(ticker, 0.0, 0.0)
    }

    /// Re-apply the invariants to a value that came in through serde.
    pub fn normalized(self) -> Self {
        let manual = self.manual_price.unwrap_or(0.0);
        Self::new(&self.ticker, self.avg_price, self.shares).with_manual_price(manual)
    }

    /// Whether the position takes part in a valuation cycle.
    pub fn is_live(&self) -> bool {
        !self.ticker.trim().is_empty()
    }

    /// The manual price, when one is set and usable.
    pub fn manual_override(&self) -> Option<f64> {
        self.manual_price.filter(|p| p.is_finite() && *p > 0.0)
    }

    /// AvgPrice × Shares
    pub fn cost_basis(&self) -> f64 {
        self.avg_price * self.shares
    }
}

/// Ordered collection of positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    positions: Vec<Position>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: Vec<Position>) -> Self {
        Self { positions }
    }

    pub fn push(&mut self, position: Position) {
        self.positions.push(position);
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn into_positions(self) -> Vec<Position> {
        self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions with a non-empty ticker, in order.
    pub fn live_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_live())
    }

    /// Tickers of the live positions, in order (duplicates kept).
    pub fn symbols(&self) -> Vec<String> {
        self.live_positions().map(|p| p.ticker.clone()).collect()
    }

    /// Last position recorded for a ticker.
    pub fn find_last(&self, ticker: &str) -> Option<&Position> {
        let ticker = normalize_ticker(ticker);
        self.positions.iter().rev().find(|p| p.ticker == ticker)
    }

    /// Rebuild the portfolio in the order of `tickers`.
    ///
    /// Holdings come from the last persisted row for each symbol; symbols
    /// without a row get zero holdings. Persisted rows whose symbol is not in
    /// `tickers` are left out.
    pub fn aligned_to(&self, tickers: &[String]) -> Portfolio {
        let positions = tickers
            .iter()
            .map(|t| normalize_ticker(t))
            .filter(|t| !t.is_empty())
            .map(|t| {
                self.find_last(&t)
                    .cloned()
                    .unwrap_or_else(|| Position::untracked(&t))
            })
            .collect();

        Portfolio { positions }
    }
}

/// Parse a comma separated ticker list ("RKLB, joby ,QS") into symbols.
pub fn parse_ticker_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(normalize_ticker)
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_normalizes() {
        let p = Position::new("  rklb ", -3.0, f64::NAN);
        assert_eq!(p.ticker, "RKLB");
        assert_eq!(p.avg_price, 0.0);
        assert_eq!(p.shares, 0.0);
        assert!(p.is_live());
        assert!(!Position::new("   ", 1.0, 1.0).is_live());
    }

    #[test]
    fn test_manual_override() {
        let p = Position::new("QS", 5.0, 10.0).with_manual_price(6.5);
        assert_eq!(p.manual_override(), Some(6.5));

        let p = Position::new("QS", 5.0, 10.0).with_manual_price(0.0);
        assert_eq!(p.manual_price, None);
        assert_eq!(p.manual_override(), None);
    }

    #[test]
    fn test_normalized_from_serde() {
        let raw: Position =
            serde_json::from_str(r#"{"ticker": " pl", "shares": 3, "manual_price": 0}"#).unwrap();
        let p = raw.normalized();
        assert_eq!(p, Position::new("PL", 0.0, 3.0));
    }

    #[test]
    fn test_parse_ticker_list() {
        assert_eq!(
            parse_ticker_list("RKLB, joby ,, QS ,"),
            vec!["RKLB".to_string(), "JOBY".to_string(), "QS".to_string()]
        );
        assert!(parse_ticker_list("  ").is_empty());
    }

    #[test]
    fn test_aligned_to_uses_last_row() {
        let portfolio = Portfolio::from_positions(vec![
            Position::new("RKLB", 5.0, 10.0),
            Position::new("JOBY", 7.0, 2.0),
            Position::new("RKLB", 6.0, 20.0),
        ]);

        let aligned = portfolio.aligned_to(&parse_ticker_list("qs, rklb"));
        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned.positions()[0], Position::untracked("QS"));
        assert_eq!(aligned.positions()[1], Position::new("RKLB", 6.0, 20.0));
    }

    #[test]
    fn test_duplicates_retained() {
        let portfolio = Portfolio::from_positions(vec![
            Position::new("RKLB", 5.0, 10.0),
            Position::new("RKLB", 6.0, 20.0),
        ]);
        assert_eq!(portfolio.symbols(), vec!["RKLB", "RKLB"]);
        assert_eq!(portfolio.find_last("rklb").map(|p| p.shares), Some(20.0));
    }
}
