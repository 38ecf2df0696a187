//! Link-embedded portfolio state.
//!
//! The whole portfolio travels in one URL query value:
//!
//! ```text
//! RKLB,8.5,100|JOBY,6,40.5|QS,0,0,7.25
//!   ticker,avg_price,shares[,manual_price]   rows joined by '|'
//! ```
//!
//! percent-encoded. Decoding never fails: malformed rows are dropped and an
//! undecodable string yields an empty portfolio.
//!
//! Tickers containing `,` or `|` cannot be represented and are not escaped.

use tracing::debug;

use crate::portfolio::{normalize_ticker, Portfolio, Position};

/// Separator between positions
pub const ROW_DELIMITER: &str = "|";

/// Separator between fields of a position
pub const FIELD_DELIMITER: &str = ",";

/// Serialize the live positions of a portfolio into a URL-safe string.
pub fn encode(portfolio: &Portfolio) -> String {
    let raw = encode_raw(portfolio);
    urlencoding::encode(&raw).into_owned()
}

/// The delimited form before percent-encoding.
pub fn encode_raw(portfolio: &Portfolio) -> String {
    portfolio
        .live_positions()
        .map(encode_row)
        .collect::<Vec<_>>()
        .join(ROW_DELIMITER)
}

fn encode_row(position: &Position) -> String {
    match position.manual_override() {
        Some(manual) => format!(
            "{}{sep}{}{sep}{}{sep}{}",
            position.ticker,
            position.avg_price,
            position.shares,
            manual,
            sep = FIELD_DELIMITER
        ),
        None => format!(
            "{}{sep}{}{sep}{}",
            position.ticker,
            position.avg_price,
            position.shares,
            sep = FIELD_DELIMITER
        ),
    }
}

/// Deserialize a persisted string. Never fails.
pub fn decode(encoded: &str) -> Portfolio {
    match urlencoding::decode(encoded) {
        Ok(raw) => decode_raw(&raw),
        Err(e) => {
            debug!(error = %e, "Persisted state is not valid percent-encoded UTF-8");
            Portfolio::new()
        }
    }
}

/// Parse the delimited form (already percent-decoded).
pub fn decode_raw(raw: &str) -> Portfolio {
    let mut portfolio = Portfolio::new();

    for (index, row) in raw.split(ROW_DELIMITER).enumerate() {
        if row.trim().is_empty() {
            continue;
        }
        match decode_row(row) {
            Some(position) => portfolio.push(position),
            None => debug!(row_index = index, row = %row, "Dropping malformed state row"),
        }
    }

    portfolio
}

/// Parse an amount field. Empty means absent (0.0); anything that is not a
/// non-negative finite number makes the row malformed.
fn parse_amount(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() {
        return Some(0.0);
    }
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn decode_row(row: &str) -> Option<Position> {
    let fields: Vec<&str> = row.split(FIELD_DELIMITER).collect();
    if fields.len() != 3 && fields.len() != 4 {
        return None;
    }

    let ticker = normalize_ticker(fields[0]);
    if ticker.is_empty() {
        return None;
    }

    let avg_price = parse_amount(fields[1])?;
    let shares = parse_amount(fields[2])?;
    let manual = match fields.get(3) {
        Some(field) => parse_amount(field)?,
        None => 0.0,
    };

    Some(Position::new(&ticker, avg_price, shares).with_manual_price(manual))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Portfolio {
        Portfolio::from_positions(vec![
            Position::new("RKLB", 8.5, 100.0),
            Position::new("JOBY", 6.0, 40.5),
            Position::new("QS", 0.0, 0.0).with_manual_price(7.25),
            Position::new("BRK.B", 0.1, 1.0 / 3.0),
        ])
    }

    #[test]
    fn test_round_trip() {
        let portfolio = sample();
        assert_eq!(decode(&encode(&portfolio)), portfolio);
    }

    #[test]
    fn test_encoded_form_is_url_safe() {
        let encoded = encode(&sample());
        assert!(!encoded.contains('|'));
        assert!(!encoded.contains(','));
        assert!(encoded.starts_with("RKLB%2C8.5%2C100%7C"));
    }

    #[test]
    fn test_raw_format() {
        let raw = encode_raw(&sample());
        assert!(raw.starts_with("RKLB,8.5,100|JOBY,6,40.5|QS,0,0,7.25|"));
    }

    #[test]
    fn test_skips_non_live_positions() {
        let portfolio = Portfolio::from_positions(vec![
            Position::new("", 1.0, 1.0),
            Position::new("PL", 2.0, 3.0),
        ]);
        assert_eq!(encode_raw(&portfolio), "PL,2,3");
    }

    #[test]
    fn test_malformed_row_dropped() {
        let portfolio = decode("RKLB,8,5|JOBY,7");
        assert_eq!(portfolio.positions(), &[Position::new("RKLB", 8.0, 5.0)]);
    }

    #[test]
    fn test_non_numeric_row_dropped() {
        let portfolio = decode_raw("RKLB,abc,5|QS,1,2|PL,1,2,xyz|ASTS,-4,1|BKSY,NaN,1");
        assert_eq!(portfolio.positions(), &[Position::new("QS", 1.0, 2.0)]);
    }

    #[test]
    fn test_empty_fields_default_to_zero() {
        let portfolio = decode_raw(" rklb ,, 3 ");
        assert_eq!(portfolio.positions(), &[Position::new("RKLB", 0.0, 3.0)]);
    }

    #[test]
    fn test_too_many_fields_dropped() {
        assert!(decode_raw("RKLB,1,2,3,4").is_empty());
    }

    #[test]
    fn test_zero_manual_price_is_no_override() {
        let portfolio = decode_raw("QS,1,2,0");
        assert_eq!(portfolio.positions()[0].manual_price, None);
    }

    #[test]
    fn test_garbage_input_yields_empty() {
        assert!(decode("").is_empty());
        assert!(decode("%FF%FE").is_empty());
        assert!(decode("|||").is_empty());
        assert!(decode("hello world").is_empty());
    }

    #[test]
    fn test_already_decoded_input() {
        let portfolio = decode("RKLB,8,5|JOBY,7,2");
        assert_eq!(portfolio.symbols(), vec!["RKLB", "JOBY"]);
    }
}
