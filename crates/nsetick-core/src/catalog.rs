//! Universe of tradable symbols.

use std::collections::BTreeMap;
use std::sync::Arc;

use csv::{ReaderBuilder, Trim};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::domain::Symbol;
use crate::error::NseError;
use crate::scrape::Scraper;

/// Immutable symbol to company-name map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CatalogSnapshot {
    names: BTreeMap<Symbol, String>,
}

impl CatalogSnapshot {
    pub fn name(&self, symbol: &Symbol) -> Option<&str> {
        self.names.get(symbol).map(String::as_str)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.names.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &str)> {
        self.names.iter().map(|(symbol, name)| (symbol, name.as_str()))
    }
}

impl FromIterator<(Symbol, String)> for CatalogSnapshot {
    fn from_iter<I: IntoIterator<Item = (Symbol, String)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

/// Parses the equity list CSV (`SYMBOL,NAME OF COMPANY,...`).
///
/// Blank lines, lines without a comma, unreadable records, the header row
/// and rows whose code is not a valid symbol are skipped. Quoted names may
/// contain commas.
pub fn parse_catalog(text: &str) -> CatalogSnapshot {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    reader
        .records()
        .filter_map(|record| {
            let record = record.ok()?;
            let code = record.get(0)?;
            let name = record.get(1)?;
            if code.eq_ignore_ascii_case("SYMBOL") {
                return None;
            }
            let symbol = Symbol::parse(code).ok()?;
            Some((symbol, name.to_owned()))
        })
        .collect()
}

/// Lazily loaded, atomically replaced symbol catalog.
#[derive(Debug)]
pub struct SymbolCatalog {
    scraper: Scraper,
    url: String,
    snapshot: RwLock<Option<Arc<CatalogSnapshot>>>,
    refresh_lock: Mutex<()>,
}

impl SymbolCatalog {
    pub fn new(scraper: Scraper, url: impl Into<String>) -> Self {
        Self {
            scraper,
            url: url.into(),
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns the current snapshot, downloading it when missing or forced.
    ///
    /// Concurrent refreshes are coalesced: callers that queued behind an
    /// in-flight download reuse its result.
    pub async fn refresh(&self, force: bool) -> Result<Arc<CatalogSnapshot>, NseError> {
        let seen = self.current().await;
        if let (Some(snapshot), false) = (&seen, force) {
            return Ok(Arc::clone(snapshot));
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(latest) = self.current().await {
            let replaced = seen
                .as_ref()
                .map_or(true, |before| !Arc::ptr_eq(before, &latest));
            if replaced {
                debug!("symbol catalog reused from concurrent refresh");
                return Ok(latest);
            }
        }

        let text = self.scraper.fetch(&self.url).await?;
        let snapshot = Arc::new(parse_catalog(&text));
        info!(symbols = snapshot.len(), force, "symbol catalog refreshed");
        *self.snapshot.write().await = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Canonical symbol for `code` if it is listed; malformed codes are
    /// simply not listed.
    pub async fn lookup(&self, code: &str) -> Result<Option<Symbol>, NseError> {
        let Ok(symbol) = Symbol::parse(code) else {
            return Ok(None);
        };
        let snapshot = self.refresh(false).await?;
        Ok(snapshot.contains(&symbol).then_some(symbol))
    }

    pub async fn is_valid(&self, code: &str) -> Result<bool, NseError> {
        Ok(self.lookup(code).await?.is_some())
    }

    /// Drops the snapshot; the next read downloads a fresh one.
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }

    async fn current(&self) -> Option<Arc<CatalogSnapshot>> {
        self.snapshot.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::http_client::ScriptedHttpClient;

    const EQUITY_LIST: &str = "SYMBOL,NAME OF COMPANY, SERIES, DATE OF LISTING\n\
INFY,Infosys Limited,EQ,08-FEB-1995\n\
\n\
M&M,Mahindra & Mahindra Limited,EQ,29-NOV-1995\n\
garbage line without separator\n\
NOT A SYMBOL,Broken Row,EQ,01-JAN-2000\n\
63MOONS,63 moons technologies limited,EQ,06-JUL-2005\n";

    fn catalog(client: Arc<ScriptedHttpClient>) -> SymbolCatalog {
        let scraper = Scraper::new(client, BTreeMap::new(), 1_000);
        SymbolCatalog::new(scraper, "https://x.test/EQUITY_L.csv")
    }

    #[test]
    fn parse_skips_header_blank_and_malformed_rows() {
        let snapshot = parse_catalog(EQUITY_LIST);
        let symbols: Vec<&str> = snapshot.iter().map(|(symbol, _)| symbol.as_str()).collect();
        assert_eq!(symbols, vec!["63MOONS", "INFY", "M&M"]);
        assert_eq!(
            snapshot.name(&Symbol::parse("infy").expect("valid")),
            Some("Infosys Limited")
        );
    }

    #[test]
    fn quoted_names_keep_their_commas() {
        let snapshot = parse_catalog(
            "SYMBOL,NAME OF COMPANY,SERIES\r\nGODREJIND,\"Godrej Industries, Ltd\",EQ\r\n",
        );
        assert_eq!(
            snapshot.name(&Symbol::parse("GODREJIND").expect("valid")),
            Some("Godrej Industries, Ltd")
        );
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn snapshot_serializes_as_an_object() {
        let snapshot = parse_catalog("INFY,Infosys Limited\n");
        let json = serde_json::to_string(&snapshot).expect("serializes");
        assert_eq!(json, r#"{"INFY":"Infosys Limited"}"#);
    }

    #[tokio::test]
    async fn validates_case_insensitively_and_loads_once() {
        let client = Arc::new(ScriptedHttpClient::new().with_body("EQUITY_L", EQUITY_LIST));
        let catalog = catalog(client.clone());

        assert!(catalog.is_valid("infy").await.expect("catalog loads"));
        assert!(catalog.is_valid(" m&m ").await.expect("catalog loads"));
        assert!(!catalog.is_valid("AAPL").await.expect("catalog loads"));
        assert!(!catalog.is_valid("").await.expect("empty codes are invalid"));
        assert_eq!(client.request_count("EQUITY_L"), 1);
    }

    #[tokio::test]
    async fn concurrent_first_use_downloads_once() {
        let client = Arc::new(ScriptedHttpClient::new().with_delayed_body(
            "EQUITY_L",
            EQUITY_LIST,
            Duration::from_millis(30),
        ));
        let catalog = Arc::new(catalog(client.clone()));

        let mut tasks = tokio::task::JoinSet::new();
        for code in ["INFY", "M&M", "63MOONS", "TCS"] {
            let catalog = Arc::clone(&catalog);
            tasks.spawn(async move { catalog.is_valid(code).await });
        }
        let mut valid = 0;
        while let Some(joined) = tasks.join_next().await {
            if joined.expect("task joins").expect("catalog loads") {
                valid += 1;
            }
        }

        assert_eq!(valid, 3);
        assert_eq!(client.request_count("EQUITY_L"), 1);
    }

    #[tokio::test]
    async fn forced_refresh_and_invalidate_download_again() {
        let client = Arc::new(ScriptedHttpClient::new().with_body("EQUITY_L", EQUITY_LIST));
        let catalog = catalog(client.clone());

        let first = catalog.refresh(false).await.expect("catalog loads");
        let forced = catalog.refresh(true).await.expect("catalog loads");
        assert!(!Arc::ptr_eq(&first, &forced));
        assert_eq!(client.request_count("EQUITY_L"), 2);

        catalog.invalidate().await;
        catalog.refresh(false).await.expect("catalog loads");
        assert_eq!(client.request_count("EQUITY_L"), 3);
    }

    #[tokio::test]
    async fn download_failure_surfaces_and_keeps_no_snapshot() {
        let client = Arc::new(ScriptedHttpClient::new().with_error("EQUITY_L", "timeout"));
        let catalog = catalog(client);

        let error = catalog.is_valid("INFY").await.expect_err("must fail");
        assert!(error.message().contains("timeout"));
        assert!(catalog.current().await.is_none());
    }
}
