//! Kokoro Common - shared configuration, errors and logging for Kokorozashi Blue.
//!
//! This crate provides:
//! - Configuration types, loading and environment overrides
//! - Configuration validation
//! - The service-boundary error type
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{Config, FxConfig, ObservabilityConfig, PipelineConfig, QuotesConfig, ServerConfig};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
