//! Behavior-driven tests for concurrent quote fetching
//!
//! These tests verify HOW the client assembles quote batches: input order,
//! unknown symbols, partial failures and JSON rendering.

use nsetick_core::{
    FixedPolicy, MarketStatus, NseClient, NseConfig, NseErrorKind, Provenance, QuoteBatch,
    ScriptedHttpClient,
};
use std::sync::Arc;
use std::time::Duration;

const EQUITY_LIST: &str = "SYMBOL,NAME OF COMPANY, SERIES\n\
INFY,Infosys Limited,EQ\n\
TCS,Tata Consultancy Services Limited,EQ\n\
M&M,Mahindra & Mahindra Limited,EQ\n\
WIPRO,Wipro Limited,EQ\n";

fn quote_page(symbol: &str, last: &str, close: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><title>{symbol}</title></head><body>
<div id="responseDiv" style="display:none">
{{"futLink":"/fut.jsp?underlying={symbol}","otherSeries":["EQ"],"lastUpdateTime":"17-OCT-2026 15:30:00","data":[{{"symbol":"{symbol}","series":"EQ","lastPrice":"{last}","closePrice":"{close}","change":"-","isExDateFlag":false,"totalTradedVolume":"1,20,345"}}],"optLink":"/opt.jsp"}}
</div></body></html>"#
    )
}

fn client_with(transport: ScriptedHttpClient, max_concurrency: usize) -> NseClient {
    recording_client(transport, max_concurrency).0
}

fn recording_client(
    transport: ScriptedHttpClient,
    max_concurrency: usize,
) -> (NseClient, Arc<ScriptedHttpClient>) {
    let transport = Arc::new(transport.with_body("EQUITY_L", EQUITY_LIST));
    let client = NseClient::builder()
        .with_config(NseConfig::default().with_max_concurrency(max_concurrency))
        .with_http_client(transport.clone())
        .with_cache_policy(Arc::new(FixedPolicy::never()))
        .build();
    (client, transport)
}

/// Every listed symbol answering after `delay`.
fn slow_quotes(delay: Duration) -> ScriptedHttpClient {
    [("INFY", "1,523.40"), ("TCS", "3,400.50"), ("M%26M", "3,120.00"), ("WIPRO", "245.10")]
        .into_iter()
        .fold(ScriptedHttpClient::new(), |transport, (symbol, last)| {
            transport.with_delayed_body(
                format!("symbol={symbol}&"),
                quote_page(symbol, last, "0.00"),
                delay,
            )
        })
}

fn native(rendered: nsetick_core::Rendered<QuoteBatch>) -> QuoteBatch {
    rendered.native().expect("native output requested")
}

// =============================================================================
// Quote Fetching: Ordering
// =============================================================================

#[tokio::test]
async fn when_workers_finish_out_of_order_system_preserves_input_order() {
    // Given: The first symbol answers slowest and the last answers fastest
    let transport = ScriptedHttpClient::new()
        .with_delayed_body(
            "symbol=INFY",
            quote_page("INFY", "1,523.40", "1,520.00"),
            Duration::from_millis(60),
        )
        .with_delayed_body(
            "symbol=TCS",
            quote_page("TCS", "3,400.50", "3,398.00"),
            Duration::from_millis(30),
        )
        .with_body("symbol=WIPRO", quote_page("WIPRO", "245.10", "244.00"));
    let client = client_with(transport, 4);

    // When: The batch is fetched
    let batch = native(
        client
            .quotes(&["INFY", "TCS", "WIPRO"], false)
            .await
            .expect("catalog loads"),
    );

    // Then: Quotes line up with the requested codes
    let symbols: Vec<Option<&str>> = batch
        .quotes
        .iter()
        .map(|quote| quote.as_ref().and_then(|q| q.get_str("symbol")))
        .collect();
    assert_eq!(symbols, vec![Some("INFY"), Some("TCS"), Some("WIPRO")]);
    assert!(!batch.is_partial());
}

#[tokio::test]
async fn when_pool_has_one_worker_system_still_fetches_every_symbol() {
    // Given: A single-permit worker pool
    let transport = ScriptedHttpClient::new()
        .with_body("symbol=INFY", quote_page("INFY", "1,523.40", "1,520.00"))
        .with_body("symbol=TCS", quote_page("TCS", "3,400.50", "3,398.00"));
    let client = client_with(transport, 1);

    // When: Two symbols are requested
    let batch = native(client.quotes(&["tcs", "infy"], false).await.expect("catalog loads"));

    // Then: Both quotes arrive in input order
    assert_eq!(batch.len(), 2);
    assert_eq!(
        batch.quotes[0].as_ref().and_then(|q| q.get_str("symbol")),
        Some("TCS")
    );
    assert_eq!(
        batch.quotes[1].as_ref().and_then(|q| q.get_str("symbol")),
        Some("INFY")
    );
}

#[tokio::test]
async fn when_pool_has_one_worker_system_fetches_one_symbol_at_a_time() {
    // Given: A single-permit pool and quotes that take a while to answer
    let (client, transport) = recording_client(slow_quotes(Duration::from_millis(20)), 1);

    // When: Four symbols are requested together
    let batch = native(
        client
            .quotes(&["INFY", "TCS", "M&M", "WIPRO"], false)
            .await
            .expect("catalog loads"),
    );

    // Then: Every quote arrives, yet no two requests overlapped
    assert!(batch.quotes.iter().all(Option::is_some));
    assert_eq!(transport.request_count("symbol="), 4);
    assert_eq!(transport.peak_in_flight(), 1);
}

#[tokio::test]
async fn when_pool_has_two_workers_system_never_exceeds_two_requests() {
    // Given: A two-permit pool and four slow symbols
    let (client, transport) = recording_client(slow_quotes(Duration::from_millis(20)), 2);

    // When: All four are requested together
    let batch = native(
        client
            .quotes(&["INFY", "TCS", "M&M", "WIPRO"], false)
            .await
            .expect("catalog loads"),
    );

    // Then: The pool is used but its bound holds
    assert!(!batch.is_partial());
    assert_eq!(transport.peak_in_flight(), 2);
}

// =============================================================================
// Quote Fetching: Invalid and Failing Symbols
// =============================================================================

#[tokio::test]
async fn when_symbol_is_unknown_system_returns_null_in_its_slot() {
    // Given: A batch mixing listed, unlisted and malformed codes
    let transport =
        ScriptedHttpClient::new().with_body("symbol=INFY", quote_page("INFY", "1,523.40", "1,520.00"));
    let client = client_with(transport, 4);

    // When: The batch is fetched
    let batch = native(
        client
            .quotes(&["AAPL", "INFY", "not a symbol!"], false)
            .await
            .expect("catalog loads"),
    );

    // Then: Only the listed symbol has a quote and nothing is reported as failed
    assert!(batch.quotes[0].is_none());
    assert!(batch.quotes[1].is_some());
    assert!(batch.quotes[2].is_none());
    assert!(batch.failures.is_empty());
}

#[tokio::test]
async fn when_one_symbol_fails_system_keeps_the_siblings() {
    // Given: TCS times out and M&M has lost its payload
    let transport = ScriptedHttpClient::new()
        .with_body("symbol=INFY", quote_page("INFY", "1,523.40", "1,520.00"))
        .with_error("symbol=TCS", "operation timed out")
        .with_body("symbol=M%26M", "<html><body>Service Unavailable</body></html>")
        .with_body("symbol=WIPRO", quote_page("WIPRO", "245.10", "244.00"));
    let client = client_with(transport, 2);

    // When: The batch is fetched
    let batch = native(
        client
            .quotes(&["INFY", "TCS", "M&M", "WIPRO"], false)
            .await
            .expect("catalog loads"),
    );

    // Then: Healthy symbols are populated and failures are itemized by index
    assert!(batch.quotes[0].is_some());
    assert!(batch.quotes[1].is_none());
    assert!(batch.quotes[2].is_none());
    assert!(batch.quotes[3].is_some());
    assert!(batch.is_partial());

    let failed: Vec<(usize, NseErrorKind)> = batch
        .failures
        .iter()
        .map(|failure| (failure.index, failure.error.kind()))
        .collect();
    assert_eq!(
        failed,
        vec![
            (1, NseErrorKind::Transport),
            (2, NseErrorKind::MalformedResponse)
        ]
    );
}

#[tokio::test]
async fn when_catalog_download_fails_system_fails_the_whole_batch() {
    // Given: The equity list is unreachable
    let client = NseClient::builder()
        .with_http_client(Arc::new(
            ScriptedHttpClient::new().with_status("EQUITY_L", 503, "busy"),
        ))
        .with_cache_policy(Arc::new(FixedPolicy::never()))
        .build();

    // When: A batch is requested
    let result = client.quotes(&["INFY"], false).await;

    // Then: The batch fails with a transport error
    let error = result.expect_err("catalog failure is fatal");
    assert_eq!(error.kind(), NseErrorKind::Transport);
}

#[tokio::test]
async fn when_single_quote_fails_system_returns_an_error() {
    // Given: The quote page is unreachable
    let transport = ScriptedHttpClient::new().with_error("symbol=INFY", "connection reset");
    let client = client_with(transport, 2);

    // When: A single quote is requested
    let result = client.quote("INFY", false).await;

    // Then: The failure is surfaced rather than turned into null
    assert_eq!(
        result.expect_err("must fail").kind(),
        NseErrorKind::Transport
    );
}

// =============================================================================
// Quote Fetching: Normalization and Market Signal
// =============================================================================

#[tokio::test]
async fn when_quote_arrives_system_normalizes_display_strings() {
    // Given: A quote with grouped numbers and dash placeholders
    let transport =
        ScriptedHttpClient::new().with_body("symbol=INFY", quote_page("INFY", "1,523.40", "0.00"));
    let client = client_with(transport, 2);

    // When: The quote is fetched
    let quote = client
        .quote("infy", false)
        .await
        .expect("quote succeeds")
        .native()
        .flatten()
        .expect("INFY is listed");

    // Then: Numbers are floats, dashes are null, other values pass through
    assert_eq!(quote.get_f64("lastPrice"), Some(1523.4));
    assert_eq!(quote.get_f64("totalTradedVolume"), Some(120345.0));
    assert!(quote.is_null("change"));
    assert_eq!(quote.get_str("series"), Some("EQ"));
    assert_eq!(quote.get("isExDateFlag"), Some(&serde_json::json!(false)));

    // And: An unsettled close price marks the market as live-open
    let state = client.market_state();
    assert_eq!(state.status, MarketStatus::Open);
    assert_eq!(state.provenance, Provenance::LiveQuote);
}

#[tokio::test]
async fn when_json_is_requested_system_returns_a_parseable_document() {
    // Given: One healthy and one unknown symbol
    let transport =
        ScriptedHttpClient::new().with_body("symbol=TCS", quote_page("TCS", "3,400.50", "3,398.00"));
    let client = client_with(transport, 2);

    // When: The batch is requested as JSON
    let json = client
        .quotes(&["TCS", "AAPL"], true)
        .await
        .expect("catalog loads")
        .json()
        .expect("json output requested");

    // Then: The document round-trips through serde_json
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(value["quotes"][0]["lastPrice"], serde_json::json!(3400.5));
    assert!(value["quotes"][1].is_null());
    assert_eq!(value["failures"], serde_json::json!([]));
}
