//! Client facade wiring every component from one [`NseConfig`].

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use time::{Date, OffsetDateTime};
use tracing::debug;

use crate::cache::CachePolicy;
use crate::calendar::HolidayCalendar;
use crate::catalog::{CatalogSnapshot, SymbolCatalog};
use crate::clock::{MarketClock, EXCHANGE_OFFSET};
use crate::config::NseConfig;
use crate::domain::{MarketState, QuoteRecord};
use crate::error::NseError;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::normalize::{render, Rendered};
use crate::quotes::{QuoteBatch, QuoteFetcher, QuoteUrls};
use crate::scrape::Scraper;
use crate::stats::{MarketStats, TopList, TopListing};

/// Builder for [`NseClient`].
///
/// ```rust,ignore
/// // Live client configured from NSETICK_* variables
/// let client = NseClientBuilder::from_env()?.build();
///
/// // Offline client for tests
/// let client = NseClientBuilder::new()
///     .with_http_client(Arc::new(ScriptedHttpClient::new()))
///     .with_cache_policy(Arc::new(FixedPolicy::never()))
///     .build();
/// ```
#[derive(Default)]
pub struct NseClientBuilder {
    config: NseConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    cache_policy: Option<Arc<dyn CachePolicy>>,
}

impl NseClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder seeded with [`NseConfig::from_env`].
    pub fn from_env() -> Result<Self, NseError> {
        Ok(Self::new().with_config(NseConfig::from_env()?))
    }

    pub fn with_config(mut self, config: NseConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the reqwest transport.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Replaces the market clock as the cache policy.
    pub fn with_cache_policy(mut self, policy: Arc<dyn CachePolicy>) -> Self {
        self.cache_policy = Some(policy);
        self
    }

    pub fn build(self) -> NseClient {
        let Self {
            config,
            http_client,
            cache_policy,
        } = self;

        let http_client =
            http_client.unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()) as Arc<dyn HttpClient>);
        let scraper = Scraper::new(http_client, config.headers.clone(), config.timeout_ms);
        let endpoints = &config.endpoints;

        let calendar = Arc::new(HolidayCalendar::new(
            scraper.clone(),
            endpoints.holidays.clone(),
        ));
        let clock = Arc::new(MarketClock::new(Arc::clone(&calendar)));
        let policy = cache_policy.unwrap_or_else(|| Arc::clone(&clock) as Arc<dyn CachePolicy>);
        let catalog = Arc::new(SymbolCatalog::new(
            scraper.clone(),
            endpoints.stock_codes.clone(),
        ));

        let quotes = QuoteFetcher::new(
            scraper.clone(),
            QuoteUrls {
                quote: endpoints.quote.clone(),
                peers: endpoints.peer_companies.clone(),
            },
            Arc::clone(&catalog),
            Arc::clone(&clock),
            Arc::clone(&policy),
            config.cache_capacity,
            config.max_concurrency,
        );
        let stats = MarketStats::new(
            scraper,
            endpoints.clone(),
            policy,
            config.cache_capacity,
        );

        NseClient {
            config,
            calendar,
            clock,
            catalog,
            quotes,
            stats,
        }
    }
}

/// Client for National Stock Exchange of India market data.
///
/// Every read operation takes an `as_json` flag: when set the result is
/// returned as a JSON string instead of native values.
#[derive(Debug)]
pub struct NseClient {
    config: NseConfig,
    calendar: Arc<HolidayCalendar>,
    clock: Arc<MarketClock>,
    catalog: Arc<SymbolCatalog>,
    quotes: QuoteFetcher,
    stats: MarketStats,
}

impl NseClient {
    pub fn builder() -> NseClientBuilder {
        NseClientBuilder::new()
    }

    pub fn config(&self) -> &NseConfig {
        &self.config
    }

    pub fn clock(&self) -> &MarketClock {
        &self.clock
    }

    /// Listed symbols and company names. `force` re-downloads the list.
    pub async fn stock_codes(
        &self,
        force: bool,
        as_json: bool,
    ) -> Result<Rendered<Arc<CatalogSnapshot>>, NseError> {
        let snapshot = self.catalog.refresh(force).await?;
        if as_json {
            return Ok(Rendered::Json(serde_json::to_string(snapshot.as_ref())?));
        }
        Ok(Rendered::Native(snapshot))
    }

    pub async fn is_valid_code(&self, code: &str) -> Result<bool, NseError> {
        self.catalog.is_valid(code).await
    }

    /// `None` (or JSON `null`) when the code is not listed.
    pub async fn quote(
        &self,
        code: &str,
        as_json: bool,
    ) -> Result<Rendered<Option<QuoteRecord>>, NseError> {
        render(self.quotes.quote(code).await?, as_json)
    }

    pub async fn quotes<S: AsRef<str>>(
        &self,
        codes: &[S],
        as_json: bool,
    ) -> Result<Rendered<QuoteBatch>, NseError> {
        render(self.quotes.fetch(codes).await?, as_json)
    }

    pub async fn top(
        &self,
        list: TopList,
        as_json: bool,
    ) -> Result<Rendered<Vec<QuoteRecord>>, NseError> {
        render(self.stats.top(list).await?, as_json)
    }

    /// Fetches each named list in order; unrecognised names are skipped.
    pub async fn top_many<S: AsRef<str>>(
        &self,
        options: &[S],
        as_json: bool,
    ) -> Result<Rendered<Vec<TopListing>>, NseError> {
        let mut listings = Vec::with_capacity(options.len());
        for option in options {
            let Ok(list) = option.as_ref().parse::<TopList>() else {
                debug!(option = option.as_ref(), "unknown list skipped");
                continue;
            };
            listings.push(TopListing {
                list,
                records: self.stats.top(list).await?,
            });
        }
        render(listings, as_json)
    }

    pub async fn index_list(&self, as_json: bool) -> Result<Rendered<Vec<String>>, NseError> {
        render(self.stats.index_list().await?, as_json)
    }

    pub async fn is_valid_index(&self, code: &str) -> Result<bool, NseError> {
        self.stats.is_valid_index(code).await
    }

    pub async fn index_quote(
        &self,
        code: &str,
        as_json: bool,
    ) -> Result<Rendered<Option<QuoteRecord>>, NseError> {
        render(self.stats.index_quote(code).await?, as_json)
    }

    pub async fn peer_companies(
        &self,
        code: &str,
        as_json: bool,
    ) -> Result<Rendered<Option<Vec<QuoteRecord>>>, NseError> {
        render(self.quotes.peer_companies(code).await?, as_json)
    }

    pub async fn is_market_open(&self) -> Result<bool, NseError> {
        self.clock.is_open_now().await
    }

    pub fn market_state(&self) -> MarketState {
        self.clock.state()
    }

    /// Non-trading dates from today (exchange time) to year end.
    pub async fn trading_holidays(&self) -> Result<Arc<BTreeSet<Date>>, NseError> {
        let today = OffsetDateTime::now_utc().to_offset(EXCHANGE_OFFSET).date();
        self.calendar.trading_holidays(today).await
    }
}

impl Display for NseClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Driver Class for National Stock Exchange (NSE)")
    }
}
