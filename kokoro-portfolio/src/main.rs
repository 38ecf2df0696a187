//! Kokorozashi Blue - portfolio valuation service.
//!
//! Serves one valuation cycle per request with resilient quote fallback,
//! RSI signals and link-persisted holdings.

use anyhow::Result;
use kokoro_common::config::Config;
use kokoro_common::logging::init_logging_with_exclusions;
use kokoro_portfolio::PortfolioService;

#[tokio::main]
async fn main() -> Result<()> {
    // Start timing immediately for cold-start measurement
    let startup_start = std::time::Instant::now();

    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    config.validate()?;

    tracing::info!("Kokorozashi Blue portfolio v{}", env!("CARGO_PKG_VERSION"));

    let service = PortfolioService::new(config);

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
