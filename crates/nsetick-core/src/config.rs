//! Client configuration: upstream endpoints, browser headers and limits.
//!
//! Values default to the public NSE endpoints and can be overridden from the
//! environment:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `NSETICK_CACHE_CAPACITY` | `64` |
//! | `NSETICK_MAX_CONCURRENCY` | 2 × available parallelism |
//! | `NSETICK_TIMEOUT_MS` | `10000` |

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::thread;

use crate::error::ValidationError;

pub const DEFAULT_CACHE_CAPACITY: usize = 64;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Upstream URLs scraped by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Quote page prefix; the encoded query string is appended.
    pub quote: String,
    pub stock_codes: String,
    pub holidays: String,
    pub top_gainers: String,
    pub top_losers: String,
    pub top_volume: String,
    pub most_active: String,
    pub advances_declines: String,
    pub index_list: String,
    /// Peer companies prefix; the symbol is appended.
    pub peer_companies: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            quote: String::from(
                "https://www.nseindia.com/live_market/dynaContent/live_watch/get_quote/GetQuote.jsp?",
            ),
            stock_codes: String::from("https://www.nseindia.com/content/equities/EQUITY_L.csv"),
            holidays: String::from(
                "https://www.nseindia.com/products/content/equities/equities/mrkt_timing_holidays.htm",
            ),
            top_gainers: String::from(
                "https://www.nseindia.com/live_market/dynaContent/live_analysis/gainers/niftyGainers1.json",
            ),
            top_losers: String::from(
                "https://www.nseindia.com/live_market/dynaContent/live_analysis/losers/niftyLosers1.json",
            ),
            top_volume: String::from(
                "https://www.nseindia.com/live_market/dynaContent/live_analysis/volume_spurts/volume_spurts.json",
            ),
            most_active: String::from(
                "https://www.nseindia.com/live_market/dynaContent/live_analysis/most_active/allTopValue1.json",
            ),
            advances_declines: String::from(
                "https://www.nseindia.com/common/json/indicesAdvanceDeclines.json",
            ),
            index_list: String::from("https://www.nseindia.com/homepage/Indices1.json"),
            peer_companies: String::from(
                "https://www.nseindia.com/live_market/dynaContent/live_watch/get_quote/ajaxPeerCompanies.jsp?symbol=",
            ),
        }
    }
}

/// Fixed browser-like header set expected by nseindia.com.
pub fn nse_headers() -> BTreeMap<String, String> {
    [
        ("Accept", "*/*"),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Host", "www.nseindia.com"),
        (
            "Referer",
            "https://www.nseindia.com/live_market/dynaContent/live_watch/get_quote/GetQuote.jsp?symbol=INFY&illiquid=0&smeFlag=0&itpFlag=0",
        ),
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0",
        ),
        ("X-Requested-With", "XMLHttpRequest"),
    ]
    .into_iter()
    .map(|(name, value)| (String::from(name), String::from(value)))
    .collect()
}

/// Worker pool size heuristic: twice the available hardware parallelism.
pub fn default_concurrency() -> usize {
    thread::available_parallelism()
        .map(|cores| cores.get() * 2)
        .unwrap_or(2)
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NseConfig {
    pub endpoints: Endpoints,
    pub headers: BTreeMap<String, String>,
    /// Entries per cache; every logical operation owns its own cache.
    pub cache_capacity: usize,
    /// Maximum number of quote fetches in flight.
    pub max_concurrency: usize,
    pub timeout_ms: u64,
}

impl Default for NseConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            headers: nse_headers(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_concurrency: default_concurrency(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl NseConfig {
    /// Defaults overridden by `NSETICK_*` environment variables.
    pub fn from_env() -> Result<Self, ValidationError> {
        let mut config = Self::default();
        if let Some(capacity) = env_value::<usize>("NSETICK_CACHE_CAPACITY")? {
            config.cache_capacity = capacity;
        }
        if let Some(concurrency) = env_value::<usize>("NSETICK_MAX_CONCURRENCY")? {
            config = config.with_max_concurrency(concurrency);
        }
        if let Some(timeout_ms) = env_value::<u64>("NSETICK_TIMEOUT_MS")? {
            config.timeout_ms = timeout_ms;
        }
        Ok(config)
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Zero is clamped to one worker.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

fn env_value<T: FromStr>(key: &'static str) -> Result<Option<T>, ValidationError> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ValidationError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ValidationError::InvalidConfig {
            key,
            value: raw.to_owned(),
        })
}
