//! Error types for Kokorozashi Blue.

use thiserror::Error;

/// Result type alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the service boundary.
///
/// Quote failures never appear here: they stay inside a valuation cycle as
/// unavailable rows or the default exchange rate.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request body or parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The valuation cycle missed its deadline
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),
}

impl Error {
    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Timeout(_) => 504,
        }
    }

    /// Stable machine-readable code for API responses.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Timeout(_) => "CYCLE_TIMEOUT",
        }
    }
}
