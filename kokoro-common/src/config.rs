//! Configuration management for Kokorozashi Blue.
//!
//! The service reads a single JSON file at `~/.kokorozashi/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (KOKORO_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `KOKORO_HOST` → server.host
//! - `KOKORO_PORT` → server.port
//! - `KOKORO_LOG_LEVEL` → observability.log_level
//! - `KOKORO_LOG_FORMAT` → observability.log_format
//! - `KOKORO_QUOTE_BASE_URL` → quotes.base_url
//! - `KOKORO_FX_DEFAULT_RATE` → fx.default_rate
//! - `KOKORO_MAX_CONCURRENCY` → pipeline.max_concurrency

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".kokorozashi"),
        |dirs| dirs.home_dir().join(".kokorozashi"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default "127.0.0.1" (local only)
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound for a whole valuation request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4480
}

fn default_request_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Quote Source Configuration
// ============================================================================

/// Upstream quote source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotesConfig {
    /// Base URL of the chart/quote API
    #[serde(default = "default_quote_base_url")]
    pub base_url: String,

    /// HTTP client timeout for a single upstream call, in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Bound on one fallback tier attempt, in milliseconds
    #[serde(default = "default_tier_timeout_ms")]
    pub tier_timeout_ms: u64,

    /// Proactive client-side rate limit (requests per minute)
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,

    /// User agent sent upstream. Some endpoints reject requests without one.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Number of daily bars requested for the RSI history window
    #[serde(default = "default_history_days")]
    pub history_days: usize,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            base_url: default_quote_base_url(),
            http_timeout_secs: default_http_timeout_secs(),
            tier_timeout_ms: default_tier_timeout_ms(),
            rate_limit_rpm: default_rate_limit_rpm(),
            user_agent: default_user_agent(),
            history_days: default_history_days(),
        }
    }
}

fn default_quote_base_url() -> String {
    "https://query1.finance.yahoo.com".into()
}

fn default_http_timeout_secs() -> u64 {
    5
}

fn default_tier_timeout_ms() -> u64 {
    4_000
}

fn default_rate_limit_rpm() -> u32 {
    120
}

fn default_user_agent() -> String {
    concat!("kokorozashi-blue/", env!("CARGO_PKG_VERSION")).into()
}

fn default_history_days() -> usize {
    60
}

/// Fewest daily bars that yield a 14-period RSI (the window plus one).
pub const MIN_HISTORY_DAYS: usize = 15;

// ============================================================================
// FX Configuration
// ============================================================================

/// USD/JPY resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxConfig {
    /// Upstream symbol for the pair
    #[serde(default = "default_fx_pair")]
    pub pair: String,

    /// Rate used when every resolution tier fails.
    ///
    /// This is a configurable default, not a market fact.
    #[serde(default = "default_fx_rate")]
    pub default_rate: f64,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            pair: default_fx_pair(),
            default_rate: default_fx_rate(),
        }
    }
}

fn default_fx_pair() -> String {
    "USDJPY=X".into()
}

/// Fallback JPY per USD.
pub const DEFAULT_FX_RATE: f64 = 150.0;

fn default_fx_rate() -> f64 {
    DEFAULT_FX_RATE
}

// ============================================================================
// Pipeline Configuration
// ============================================================================

/// Valuation cycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of symbols resolved concurrently
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Tickers shown when the caller supplies neither state nor a list
    #[serde(default = "default_tickers")]
    pub default_tickers: Vec<String>,

    /// Deadline for one valuation cycle served over HTTP, in milliseconds
    #[serde(default = "default_cycle_timeout_ms")]
    pub cycle_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_tickers: default_tickers(),
            cycle_timeout_ms: default_cycle_timeout_ms(),
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}

fn default_cycle_timeout_ms() -> u64 {
    25_000
}

fn default_tickers() -> Vec<String> {
    ["RKLB", "JOBY", "QS", "BKSY", "PL", "ASTS"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets forced to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub quotes: QuotesConfig,

    #[serde(default)]
    pub fx: FxConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Unparsable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("KOKORO_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("KOKORO_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(level) = lookup("KOKORO_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("KOKORO_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(url) = lookup("KOKORO_QUOTE_BASE_URL") {
            self.quotes.base_url = url;
        }
        if let Some(rate) = lookup("KOKORO_FX_DEFAULT_RATE").and_then(|v| v.parse().ok()) {
            self.fx.default_rate = rate;
        }
        if let Some(n) = lookup("KOKORO_MAX_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.pipeline.max_concurrency = n;
        }
    }

    /// Socket address string for the HTTP server.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 4480);
        assert_eq!(config.fx.pair, "USDJPY=X");
        assert!((config.fx.default_rate - 150.0).abs() < f64::EPSILON);
        assert_eq!(config.pipeline.default_tickers.len(), 6);
        assert_eq!(config.pipeline.default_tickers[0], "RKLB");
        assert_eq!(config.bind_address(), "127.0.0.1:4480");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server": {{"port": 9000}}, "fx": {{"default_rate": 142.5}}, "observability": {{"level": "debug"}}}}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!((config.fx.default_rate - 142.5).abs() < f64::EPSILON);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.quotes.tier_timeout_ms, 4_000);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("KOKORO_PORT", "8081"),
            ("KOKORO_FX_DEFAULT_RATE", "151.25"),
            ("KOKORO_MAX_CONCURRENCY", "not-a-number"),
            ("KOKORO_QUOTE_BASE_URL", "http://localhost:9999"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 8081);
        assert!((config.fx.default_rate - 151.25).abs() < f64::EPSILON);
        assert_eq!(config.pipeline.max_concurrency, 4);
        assert_eq!(config.quotes.base_url, "http://localhost:9999");
    }
}
