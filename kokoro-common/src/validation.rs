//! Configuration validation.
//!
//! Rejects configurations that would make a valuation cycle misbehave:
//! zero timeouts, a zero worker bound, a non-positive fallback FX rate, or an
//! RSI history too short to ever leave the neutral value.

use thiserror::Error;

use crate::config::{
    Config, FxConfig, ObservabilityConfig, PipelineConfig, QuotesConfig, ServerConfig,
    MIN_HISTORY_DAYS,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.server.validate(),
            self.quotes.validate(),
            self.fx.validate(),
            self.pipeline.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

fn positive(field: &str, value: u64) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: "must be greater than 0".into(),
        });
    }
    Ok(())
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "server.host".into(),
            });
        }
        positive("server.request_timeout_secs", self.request_timeout_secs)
    }
}

impl Validate for QuotesConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "quotes.base_url".into(),
            });
        }
        positive("quotes.http_timeout_secs", self.http_timeout_secs)?;
        positive("quotes.tier_timeout_ms", self.tier_timeout_ms)?;
        positive("quotes.rate_limit_rpm", u64::from(self.rate_limit_rpm))?;
        if self.history_days < MIN_HISTORY_DAYS {
            return Err(ValidationError::InvalidValue {
                field: "quotes.history_days".into(),
                reason: format!(
                    "must be at least {}, got {}",
                    MIN_HISTORY_DAYS, self.history_days
                ),
            });
        }
        Ok(())
    }
}

impl Validate for FxConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !self.default_rate.is_finite() || self.default_rate <= 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "fx.default_rate".into(),
                reason: format!("must be a positive number, got {}", self.default_rate),
            });
        }
        if self.pair.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "fx.pair".into(),
            });
        }
        Ok(())
    }
}

impl Validate for PipelineConfig {
    fn validate(&self) -> ValidationResult<()> {
        positive("pipeline.max_concurrency", self.max_concurrency as u64)?;
        positive("pipeline.cycle_timeout_ms", self.cycle_timeout_ms)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}
