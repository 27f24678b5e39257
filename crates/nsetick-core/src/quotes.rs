//! Concurrent quote fetching.
//!
//! [`QuoteFetcher::fetch`] validates every code against the catalog, then
//! scrapes the listed ones on a bounded pool of tokio tasks. Results are
//! written back by input position, so output order never depends on
//! completion order, and one failing symbol never voids its siblings.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::{CacheManager, CachePolicy};
use crate::catalog::SymbolCatalog;
use crate::clock::MarketClock;
use crate::domain::{QuoteRecord, Symbol};
use crate::error::NseError;
use crate::extract::{embedded_object, embedded_objects, parse_embedded, QUOTE_LANDMARK};
use crate::normalize::normalize_value;
use crate::scrape::Scraper;

/// Field carrying the settlement price used as the live market signal.
pub const CLOSE_PRICE_FIELD: &str = "closePrice";

/// A symbol whose fetch failed inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteFailure {
    pub index: usize,
    pub symbol: Symbol,
    pub error: NseError,
}

/// Quotes aligned with the requested codes.
///
/// Unknown codes and failed fetches hold `None`; failures are also listed
/// in `failures`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuoteBatch {
    pub quotes: Vec<Option<QuoteRecord>>,
    pub failures: Vec<QuoteFailure>,
}

impl QuoteBatch {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// Upstream locations used by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteUrls {
    /// Prefix to which the encoded query string is appended.
    pub quote: String,
    /// Prefix to which the encoded symbol is appended.
    pub peers: String,
}

impl QuoteUrls {
    pub fn quote_url(&self, symbol: &Symbol) -> String {
        format!(
            "{}symbol={}&illiquid=0&smeFlag=0&itpFlag=0",
            self.quote,
            urlencoding::encode(symbol.as_str())
        )
    }

    pub fn peers_url(&self, symbol: &Symbol) -> String {
        format!("{}{}", self.peers, urlencoding::encode(symbol.as_str()))
    }
}

#[derive(Debug)]
struct Worker {
    scraper: Scraper,
    urls: QuoteUrls,
    clock: Arc<MarketClock>,
    cache: CacheManager<Symbol, QuoteRecord>,
}

impl Worker {
    async fn quote(&self, symbol: &Symbol) -> Result<QuoteRecord, NseError> {
        self.cache
            .get_or_compute(symbol.clone(), || self.scrape_quote(symbol))
            .await
    }

    /// Downloads a quote; only fresh quotes feed the market clock.

    async fn scrape_quote(&self, symbol: &Symbol) -> Result<QuoteRecord, NseError> {
        let url = self.urls.quote_url(symbol);
        let page = self.scraper.fetch(&url).await?;
        let block = embedded_object(&page, QUOTE_LANDMARK)?;
        let payload = parse_embedded(block)?;
        let first = payload
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .ok_or_else(|| {
                NseError::malformed(format!("{symbol}: quote payload has no data rows"))
            })?;
        let record = normalize_value(first)?;
        if let Some(close) = record.get_f64(CLOSE_PRICE_FIELD) {
            self.clock.observe_close_price(close);
        }
        Ok(record)
    }
}

/// Bounded, order-preserving quote fetcher.
#[derive(Debug)]
pub struct QuoteFetcher {
    worker: Arc<Worker>,
    catalog: Arc<SymbolCatalog>,
    permits: Arc<Semaphore>,
}

impl QuoteFetcher {
    pub fn new(
        scraper: Scraper,
        urls: QuoteUrls,
        catalog: Arc<SymbolCatalog>,
        clock: Arc<MarketClock>,
        policy: Arc<dyn CachePolicy>,
        cache_capacity: usize,
        max_concurrency: usize,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                scraper,
                urls,
                clock,
                cache: CacheManager::new("quote", cache_capacity, policy),
            }),
            catalog,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Fetches quotes for `codes`, one slot per input.
    ///
    /// A catalog download failure fails the whole call; per-symbol failures
    /// are reported in [`QuoteBatch::failures`].
    pub async fn fetch<S: AsRef<str>>(&self, codes: &[S]) -> Result<QuoteBatch, NseError> {
        let mut batch = QuoteBatch {
            quotes: vec![None; codes.len()],
            failures: Vec::new(),
        };
        if codes.is_empty() {
            return Ok(batch);
        }

        let snapshot = self.catalog.refresh(false).await?;
        let mut dispatched = Vec::new();
        let mut tasks = JoinSet::new();

        for (index, code) in codes.iter().enumerate() {
            let Ok(symbol) = Symbol::parse(code.as_ref()) else {
                continue;
            };
            if !snapshot.contains(&symbol) {
                debug!(%symbol, "unknown symbol skipped");
                continue;
            }

            dispatched.push((index, symbol.clone()));
            let worker = Arc::clone(&self.worker);
            let permits = Arc::clone(&self.permits);
            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => worker.quote(&symbol).await,
                    Err(_) => Err(NseError::internal("quote worker pool is closed")),
                };
                (index, symbol, result)
            });
        }

        let mut settled = BTreeSet::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((index, symbol, result)) = joined else {
                // Panicked workers are accounted for below.
                continue;
            };
            settled.insert(index);
            match result {
                Ok(record) => batch.quotes[index] = Some(record),
                Err(error) => {
                    warn!(%symbol, error = %error, "quote fetch failed");
                    batch.failures.push(QuoteFailure {
                        index,
                        symbol,
                        error,
                    });
                }
            }
        }

        for (index, symbol) in dispatched {
            if !settled.contains(&index) {
                warn!(%symbol, "quote worker panicked");
                batch.failures.push(QuoteFailure {
                    index,
                    symbol,
                    error: NseError::internal("quote worker panicked"),
                });
            }
        }
        batch.failures.sort_by_key(|failure| failure.index);

        Ok(batch)
    }

    /// Quote for one code; `None` when the code is not listed.
    pub async fn quote(&self, code: &str) -> Result<Option<QuoteRecord>, NseError> {
        let Some(symbol) = self.catalog.lookup(code).await? else {
            return Ok(None);
        };
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| NseError::internal("quote worker pool is closed"))?;
        self.worker.quote(&symbol).await.map(Some)
    }

    /// Peer companies listed alongside `code`, without the `industry` field.
    pub async fn peer_companies(&self, code: &str) -> Result<Option<Vec<QuoteRecord>>, NseError> {
        let Some(symbol) = self.catalog.lookup(code).await? else {
            return Ok(None);
        };
        let page = self
            .worker
            .scraper
            .fetch(&self.worker.urls.peers_url(&symbol))
            .await?;

        let mut peers = Vec::new();
        for block in embedded_objects(&page)? {
            let mut payload = parse_embedded(block)?;
            if let Some(fields) = payload.as_object_mut() {
                fields.remove("industry");
            }
            peers.push(normalize_value(&payload)?);
        }
        Ok(Some(peers))
    }

    pub fn cache(&self) -> &CacheManager<Symbol, QuoteRecord> {
        &self.worker.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::cache::FixedPolicy;
    use crate::calendar::HolidayCalendar;
    use crate::domain::MarketStatus;
    use crate::error::NseErrorKind;
    use crate::http_client::ScriptedHttpClient;

    const EQUITY_LIST: &str = "SYMBOL,NAME OF COMPANY\nINFY,Infosys\nTCS,Tata Consultancy\nM&M,Mahindra\n";

    fn quote_page(symbol: &str, close: &str) -> String {
        format!(
            r#"<html><div id="responseDiv" style="display:none">{{"data":[{{"symbol":"{symbol}","lastPrice":"1,523.40","closePrice":"{close}","pChange":"-"}}],"isinCode":null}}</div></html>"#
        )
    }

    fn fetcher(
        client: ScriptedHttpClient,
        policy: FixedPolicy,
    ) -> (QuoteFetcher, Arc<MarketClock>, Arc<ScriptedHttpClient>) {
        let client = Arc::new(client.with_body("EQUITY_L", EQUITY_LIST));
        let scraper = Scraper::new(client.clone(), BTreeMap::new(), 1_000);
        let catalog = Arc::new(SymbolCatalog::new(scraper.clone(), "https://x.test/EQUITY_L.csv"));
        let calendar = Arc::new(HolidayCalendar::new(scraper.clone(), "https://x.test/holidays"));
        let clock = Arc::new(MarketClock::new(calendar));
        let urls = QuoteUrls {
            quote: String::from("https://x.test/GetQuote.jsp?"),
            peers: String::from("https://x.test/peers.jsp?symbol="),
        };
        let fetcher = QuoteFetcher::new(
            scraper,
            urls,
            catalog,
            Arc::clone(&clock),
            Arc::new(policy),
            64,
            4,
        );
        (fetcher, clock, client)
    }

    #[test]
    fn quote_url_encodes_the_symbol() {
        let urls = QuoteUrls {
            quote: String::from("https://x.test/GetQuote.jsp?"),
            peers: String::from("https://x.test/peers.jsp?symbol="),
        };
        let symbol = Symbol::parse("m&m").expect("valid");
        assert_eq!(
            urls.quote_url(&symbol),
            "https://x.test/GetQuote.jsp?symbol=M%26M&illiquid=0&smeFlag=0&itpFlag=0"
        );
        assert_eq!(urls.peers_url(&symbol), "https://x.test/peers.jsp?symbol=M%26M");
    }

    #[tokio::test]
    async fn single_quote_is_normalized_and_feeds_the_clock() {
        let client = ScriptedHttpClient::new().with_body("symbol=INFY", quote_page("INFY", "0.00"));
        let (fetcher, clock, _) = fetcher(client, FixedPolicy::never());

        let record = fetcher
            .quote("infy")
            .await
            .expect("quote succeeds")
            .expect("INFY is listed");

        assert_eq!(record.get_f64("lastPrice"), Some(1523.4));
        assert!(record.is_null("pChange"));
        assert!(record.get("isinCode").is_none());
        assert_eq!(clock.state().status, MarketStatus::Open);
    }

    #[tokio::test]
    async fn unknown_code_is_none_without_scraping() {
        let (fetcher, _, client) = fetcher(ScriptedHttpClient::new(), FixedPolicy::never());
        assert_eq!(fetcher.quote("AAPL").await.expect("catalog loads"), None);
        assert_eq!(client.request_count("GetQuote"), 0);
    }

    #[tokio::test]
    async fn missing_payload_is_malformed() {
        let client = ScriptedHttpClient::new().with_body("symbol=TCS", "<html>maintenance</html>");
        let (fetcher, _, _) = fetcher(client, FixedPolicy::never());
        let error = fetcher.quote("TCS").await.expect_err("no payload");
        assert_eq!(error.kind(), NseErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn batch_keeps_order_and_reports_failures() {
        let client = ScriptedHttpClient::new()
            .with_body("symbol=INFY", quote_page("INFY", "1,500.00"))
            .with_error("symbol=TCS", "connection reset");
        let (fetcher, _, _) = fetcher(client, FixedPolicy::never());

        let batch = fetcher
            .fetch(&["INFY", "NOPE", "TCS"])
            .await
            .expect("catalog loads");

        assert_eq!(batch.len(), 3);
        assert_eq!(
            batch.quotes[0].as_ref().and_then(|q| q.get_str("symbol")),
            Some("INFY")
        );
        assert!(batch.quotes[1].is_none());
        assert!(batch.quotes[2].is_none());
        assert!(batch.is_partial());
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].index, 2);
        assert_eq!(batch.failures[0].error.kind(), NseErrorKind::Transport);
    }

    #[tokio::test]
    async fn cached_quotes_skip_the_network_when_allowed() {
        let client = ScriptedHttpClient::new().with_body("symbol=INFY", quote_page("INFY", "1,500.00"));
        let (fetcher, _, client) = fetcher(client, FixedPolicy::always());

        fetcher.quote("INFY").await.expect("quote succeeds");
        fetcher.quote("INFY").await.expect("quote succeeds");

        assert_eq!(client.request_count("symbol=INFY"), 1);
        assert_eq!(fetcher.cache().len().await, 1);
    }

    #[tokio::test]
    async fn cached_quotes_do_not_feed_the_clock() {
        let client = ScriptedHttpClient::new().with_body("symbol=INFY", quote_page("INFY", "1,500.00"));
        let (fetcher, clock, _) = fetcher(client, FixedPolicy::always());

        fetcher.quote("INFY").await.expect("quote succeeds");
        assert_eq!(clock.state().status, MarketStatus::Closed);

        clock.observe_close_price(0.0);
        fetcher.quote("INFY").await.expect("served from cache");
        assert_eq!(clock.state().status, MarketStatus::Open);
    }

    #[tokio::test]
    async fn peers_drop_the_industry_field() {
        let peers = r#"[{"symbol":"TCS","industry":"IT","ltp":"3,400.5"},{"symbol":"WIPRO","industry":"IT","ltp":"-"}]"#;
        let client = ScriptedHttpClient::new().with_body("peers.jsp", peers);
        let (fetcher, _, _) = fetcher(client, FixedPolicy::never());

        let records = fetcher
            .peer_companies("INFY")
            .await
            .expect("peers load")
            .expect("INFY is listed");

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.get("industry").is_none()));
        assert_eq!(records[0].get_f64("ltp"), Some(3400.5));
        assert!(records[1].is_null("ltp"));
    }
}
