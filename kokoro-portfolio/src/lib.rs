//! Kokorozashi Blue portfolio service.
//!
//! Values a small equity portfolio in USD and JPY from an unreliable public
//! quote source, and keeps the portfolio itself in a shareable link.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                   kokoro-portfolio (Rust Service)                   │
//! │                              :4480                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────────┐   ┌───────────────────────┐  │
//! │  │ StateCodec  │──>│    Pipeline     │──>│ Valuation / Signals   │  │
//! │  └─────────────┘   └─────────────────┘   └───────────────────────┘  │
//! │                      │             │                                │
//! │              ┌───────┴──────┐ ┌────┴───────┐                        │
//! │              │QuoteResolver │ │ FxResolver │                        │
//! │              └───────┬──────┘ └────┬───────┘                        │
//! │                      └─────┬───────┘                                │
//! │                     ┌──────┴───────┐                                │
//! │                     │ YahooAdapter │                                │
//! │                     └──────────────┘                                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Tiered quotes
//! A price comes from the first tier that answers with a finite positive
//! value: manual override, batched intraday, single-symbol intraday, daily
//! bar, last quote. A symbol for which every tier fails is reported as
//! unavailable and left out of the totals.
//!
//! ## Link state
//! `TICKER,avg,shares[,manual]` rows joined by `|`, percent-encoded into the
//! `data` query parameter. Nothing is stored server side.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod codec;
pub mod data;
pub mod pipeline;
pub mod portfolio;
pub mod quote;
pub mod routes;
pub mod signal;
pub mod valuation;

use anyhow::Result;
use axum::http::StatusCode;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use kokoro_common::config::Config;

use crate::data::{QuoteProvider, YahooAdapter};
use crate::pipeline::Pipeline;

pub use crate::pipeline::{PipelineError, PipelineReport};
pub use crate::portfolio::{Portfolio, Position};

/// Portfolio service state
pub struct PortfolioState {
    /// Configuration
    pub config: Config,
    /// Upstream quote source
    pub provider: Arc<dyn QuoteProvider>,
    /// Valuation pipeline
    pub pipeline: Pipeline,
}

impl PortfolioState {
    /// Create state backed by the Yahoo adapter
    pub fn new(config: Config) -> Self {
        let provider: Arc<dyn QuoteProvider> = Arc::new(YahooAdapter::from_config(&config.quotes));
        Self::with_provider(config, provider)
    }

    /// Create state around any quote provider
    pub fn with_provider(config: Config, provider: Arc<dyn QuoteProvider>) -> Self {
        let pipeline = Pipeline::from_config(Arc::clone(&provider), &config);

        Self {
            config,
            provider,
            pipeline,
        }
    }
}

/// Main portfolio service
pub struct PortfolioService {
    state: Arc<PortfolioState>,
}

impl PortfolioService {
    /// Create a new portfolio service
    pub fn new(config: Config) -> Self {
        Self {
            state: Arc::new(PortfolioState::new(config)),
        }
    }

    /// Create a service around an existing state
    pub fn from_state(state: Arc<PortfolioState>) -> Self {
        Self { state }
    }

    /// Routes with CORS and the request timeout applied.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let timeout = Duration::from_secs(self.state.config.server.request_timeout_secs);

        routes::build_router(Arc::clone(&self.state))
            .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
            .layer(cors)
    }

    /// Start the portfolio service
    pub async fn start(self) -> Result<()> {
        let provider = Arc::clone(&self.state.provider);
        tokio::spawn(async move {
            match provider.health_check().await {
                Ok(()) => tracing::info!(provider = provider.name(), "Quote provider reachable"),
                Err(e) => tracing::warn!(
                    provider = provider.name(),
                    error = %e,
                    "Quote provider health check failed, quotes will fall back tier by tier"
                ),
            }
        });

        let addr: SocketAddr = self.state.config.bind_address().parse()?;
        tracing::info!(address = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Portfolio service stopped");
        Ok(())
    }
}

/// Completes on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
