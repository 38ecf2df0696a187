//! HTTP routes for the portfolio service.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use kokoro_common::Error;

use crate::codec;
use crate::pipeline::{PipelineError, PipelineReport};
use crate::portfolio::{parse_ticker_list, Portfolio, Position};
use crate::PortfolioState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Query of the valuation endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct PortfolioQuery {
    /// Persisted state string
    #[serde(default)]
    pub data: Option<String>,
    /// Comma separated ticker list
    #[serde(default)]
    pub tickers: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EncodeRequest {
    pub positions: Vec<Position>,
}

#[derive(Debug, Serialize)]
pub struct EncodeResponse {
    pub data: String,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct DecodeQuery {
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct DecodeResponse {
    pub positions: Vec<Position>,
    pub count: usize,
}

// ============================================================================
// Errors
// ============================================================================

/// Error body of a failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Service error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorBody {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Routes without middleware.
pub fn build_router(state: Arc<PortfolioState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/portfolio", get(get_portfolio))
        .route("/api/v1/portfolio/encode", post(encode_portfolio))
        .route("/api/v1/portfolio/decode", get(decode_portfolio))
        .with_state(state)
}

/// Portfolio to value for a request.
///
/// An explicit ticker list fixes the rows and their order, taking holdings
/// from the persisted state. Without one the persisted rows are used as is,
/// and with neither the configured default tickers are shown.
pub fn resolve_portfolio(query: &PortfolioQuery, default_tickers: &[String]) -> Portfolio {
    let persisted = query
        .data
        .as_deref()
        .map(codec::decode)
        .unwrap_or_default();

    let tickers = query
        .tickers
        .as_deref()
        .map(parse_ticker_list)
        .filter(|t| !t.is_empty());

    match tickers {
        Some(tickers) => persisted.aligned_to(&tickers),
        None if persisted.is_empty() => persisted.aligned_to(default_tickers),
        None => persisted,
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "kokoro-portfolio".to_string(),
    })
}

/// Run one valuation cycle within the configured deadline
pub async fn get_portfolio(
    State(state): State<Arc<PortfolioState>>,
    Query(query): Query<PortfolioQuery>,
) -> Result<Json<PipelineReport>, ApiError> {
    let portfolio = resolve_portfolio(&query, &state.config.pipeline.default_tickers);
    let deadline_ms = state.config.pipeline.cycle_timeout_ms;

    let report = state
        .pipeline
        .run_until(&portfolio, tokio::time::sleep(Duration::from_millis(deadline_ms)))
        .await
        .map_err(|e| match e {
            PipelineError::Cancelled => {
                warn!(deadline_ms, positions = portfolio.len(), "Valuation cycle missed its deadline");
                Error::Timeout(deadline_ms)
            }
        })?;

    Ok(Json(report))
}

/// Re-encode edited positions into a new state string
pub async fn encode_portfolio(
    payload: Result<Json<EncodeRequest>, JsonRejection>,
) -> Result<Json<EncodeResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| Error::InvalidInput(e.body_text()))?;

    let portfolio = Portfolio::from_positions(
        request
            .positions
            .into_iter()
            .map(Position::normalized)
            .collect(),
    );

    let data = codec::encode(&portfolio);
    let count = portfolio.live_positions().count();
    debug!(count, "Encoded portfolio state");

    Ok(Json(EncodeResponse { data, count }))
}

/// Decode a state string
pub async fn decode_portfolio(Query(query): Query<DecodeQuery>) -> Json<DecodeResponse> {
    let positions = codec::decode(&query.data).into_positions();
    let count = positions.len();
    Json(DecodeResponse { positions, count })
}
