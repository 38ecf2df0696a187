//! Integration tests for the Yahoo adapter against a mock HTTP server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kokoro_portfolio::data::{ProviderError, QuoteProvider, YahooAdapter};
use kokoro_portfolio::pipeline::Pipeline;
use kokoro_portfolio::quote::{FxResolver, QuoteSource, RateSource};
use kokoro_portfolio::signal::Signal;
use kokoro_portfolio::{Portfolio, Position};

fn adapter(server: &MockServer) -> YahooAdapter {
    YahooAdapter::new(server.uri(), Duration::from_secs(2), 6000, "kokoro-test")
}

fn chart_body(timestamps: &[i64], closes: serde_json::Value) -> serde_json::Value {
    json!({
        "chart": {
            "result": [{
                "meta": {"symbol": "RKLB"},
                "timestamp": timestamps,
                "indicators": {"quote": [{"close": closes}]}
            }],
            "error": null
        }
    })
}

// ============================================================================
// Chart
// ============================================================================

#[tokio::test]
async fn test_intraday_drops_null_closes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/RKLB"))
        .and(query_param("interval", "1m"))
        .and(query_param("includePrePost", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(
            &[1_700_000_000, 1_700_000_060, 1_700_000_120],
            json!([21.0, null, 21.4]),
        )))
        .mount(&server)
        .await;

    let candles = adapter(&server).intraday_candles("RKLB").await.unwrap();

    assert_eq!(candles.len(), 2);
    assert_eq!(candles.last().map(|c| c.close), Some(21.4));
}

#[tokio::test]
async fn test_daily_candles_truncated_to_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/JOBY"))
        .and(query_param("interval", "1d"))
        .and(query_param("includePrePost", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(
            &[100, 200, 300, 400],
            json!([6.0, 6.1, 6.2, 6.3]),
        )))
        .mount(&server)
        .await;

    let candles = adapter(&server).daily_candles("JOBY", 2).await.unwrap();

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    assert_eq!(closes, vec![6.2, 6.3]);
}

#[tokio::test]
async fn test_chart_error_payload_is_data_not_available() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/NOPE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        })))
        .mount(&server)
        .await;

    let err = adapter(&server).intraday_candles("NOPE").await.unwrap_err();
    assert!(matches!(err, ProviderError::DataNotAvailable(ref msg) if msg.contains("delisted")));
}

// ============================================================================
// Status Mapping
// ============================================================================

#[tokio::test]
async fn test_rate_limited_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = adapter(&server).intraday_candles("RKLB").await.unwrap_err();
    assert!(matches!(err, ProviderError::RateLimited { .. }));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_forbidden_status_is_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = adapter(&server).last_price("RKLB").await.unwrap_err();
    assert!(matches!(err, ProviderError::Auth(_)));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = adapter(&server).daily_candles("RKLB", 5).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
}

#[tokio::test]
async fn test_malformed_body_is_internal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>consent</html>"))
        .mount(&server)
        .await;

    let err = adapter(&server).intraday_candles("RKLB").await.unwrap_err();
    assert!(matches!(err, ProviderError::Internal(_)));
}

#[tokio::test]
async fn test_unreachable_host_is_network() {
    let adapter = YahooAdapter::new("http://127.0.0.1:9", Duration::from_secs(1), 6000, "kokoro-test");

    let err = adapter.last_price("RKLB").await.unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)));
}

// ============================================================================
// Spark (batch)
// ============================================================================

#[tokio::test]
async fn test_batch_multi_symbol_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/spark"))
        .and(query_param("symbols", "RKLB,JOBY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spark": {
                "result": [
                    {"symbol": "RKLB", "response": [{
                        "meta": {"symbol": "RKLB"},
                        "timestamp": [1, 2],
                        "indicators": {"quote": [{"close": [20.0, 20.5]}]}
                    }]},
                    {"symbol": "JOBY", "response": [{
                        "meta": {"symbol": "JOBY"},
                        "timestamp": [1, 2],
                        "indicators": {"quote": [{"close": [7.0, null]}]}
                    }]}
                ],
                "error": null
            }
        })))
        .mount(&server)
        .await;

    let symbols = vec!["RKLB".to_string(), "JOBY".to_string()];
    let quotes = adapter(&server).batch_intraday(&symbols).await.unwrap();

    assert_eq!(quotes.get("RKLB"), Some(20.5));
    assert_eq!(quotes.get("JOBY"), Some(7.0));
}

#[tokio::test]
async fn test_batch_single_symbol_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/spark"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spark": {
                "result": {"symbol": "QS", "response": {
                    "timestamp": [1, 2, 3],
                    "indicators": {"quote": [{"close": [6.0, 6.1, null]}]}
                }}
            }
        })))
        .mount(&server)
        .await;

    let quotes = adapter(&server)
        .batch_intraday(&["QS".to_string()])
        .await
        .unwrap();

    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes.get("QS"), Some(6.1));
}

#[tokio::test]
async fn test_batch_flat_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/spark"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "PL": {"symbol": "PL", "close": [3.0, 3.2]},
            "BKSY": {"symbol": "BKSY", "close": [11.0]}
        })))
        .mount(&server)
        .await;

    let symbols = vec!["PL".to_string(), "BKSY".to_string()];
    let quotes = adapter(&server).batch_intraday(&symbols).await.unwrap();

    assert_eq!(quotes.get("PL"), Some(3.2));
    assert_eq!(quotes.get("BKSY"), Some(11.0));
}

#[tokio::test]
async fn test_batch_without_prices_is_data_not_available() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/spark"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"spark": {"result": []}})))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .batch_intraday(&["ASTS".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::DataNotAvailable(_)));
}

#[tokio::test]
async fn test_batch_with_no_symbols_skips_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let quotes = adapter(&server).batch_intraday(&[]).await.unwrap();
    assert!(quotes.is_empty());
}

// ============================================================================
// Quote snapshot
// ============================================================================

#[tokio::test]
async fn test_last_price_prefers_post_market() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/quote"))
        .and(query_param("symbols", "RKLB"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteResponse": {
                "result": [{
                    "symbol": "RKLB",
                    "marketState": "POST",
                    "regularMarketPrice": 21.0,
                    "postMarketPrice": 21.35
                }],
                "error": null
            }
        })))
        .mount(&server)
        .await;

    let price = adapter(&server).last_price("RKLB").await.unwrap();
    assert_eq!(price, Some(21.35));
}

#[tokio::test]
async fn test_last_price_unknown_symbol() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteResponse": {"result": [], "error": null}
        })))
        .mount(&server)
        .await;

    assert_eq!(adapter(&server).last_price("ZZZZ").await.unwrap(), None);
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/SPY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(&[1], json!([450.0]))))
        .mount(&server)
        .await;

    assert!(adapter(&server).health_check().await.is_ok());
}

// ============================================================================
// Valuation cycle over the adapter
// ============================================================================

#[tokio::test]
async fn test_rate_limit_queueing_does_not_degrade_tiers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/spark"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let timestamps: Vec<i64> = (0..30).map(|i| 1_700_000_000 + i * 86_400).collect();
    let closes: Vec<f64> = (0..30).map(|i| 10.0 + i as f64 * 0.5).collect();
    Mock::given(method("GET"))
        .and(path_regex(r"^/v8/finance/chart/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(&timestamps, json!(closes))))
        .mount(&server)
        .await;

    // 1200 rpm: a bucket of 20 tokens for more than 40 requests
    let provider: Arc<dyn QuoteProvider> = Arc::new(YahooAdapter::new(
        server.uri(),
        Duration::from_secs(2),
        1200,
        "kokoro-test",
    ));
    let tier_timeout = Duration::from_millis(250);
    let fx = FxResolver::new(Arc::clone(&provider), "USDJPY=X", 150.0, tier_timeout);
    let pipeline = Pipeline::new(provider, fx, 4, tier_timeout, 30);

    let holdings = Portfolio::from_positions(
        (0..20)
            .map(|i| Position::new(&format!("S{:02}", i), 10.0, 1.0))
            .collect(),
    );
    let report = pipeline.run(&holdings).await;

    assert_eq!(report.rows.len(), 20);
    assert!(report.totals.unavailable.is_empty());
    assert_eq!(report.exchange_rate.source, RateSource::Quote(QuoteSource::Intraday));

    for row in report.priced_rows() {
        assert_eq!(row.source, QuoteSource::Intraday, "{}", row.symbol);
        assert_eq!(row.price, 24.5);
        assert_eq!(row.rsi, 100.0, "{}", row.symbol);
        assert_eq!(row.signal, Signal::Sell);
    }
}
