//! Exchange-wide statistics: top movers, breadth and index snapshots.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheManager, CachePolicy};
use crate::config::Endpoints;
use crate::domain::QuoteRecord;
use crate::error::{NseError, ValidationError};
use crate::normalize::normalize_all;
use crate::scrape::Scraper;

/// Field naming an index in the index list.
const INDEX_NAME_FIELD: &str = "name";

/// Batch-statistics documents published by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopList {
    Gainers,
    Losers,
    Volume,
    MostActive,
    AdvancesDeclines,
    IndexList,
}

impl TopList {
    pub const ALL: [Self; 6] = [
        Self::Gainers,
        Self::Losers,
        Self::Volume,
        Self::MostActive,
        Self::AdvancesDeclines,
        Self::IndexList,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gainers => "gainers",
            Self::Losers => "losers",
            Self::Volume => "volume",
            Self::MostActive => "active",
            Self::AdvancesDeclines => "advances decline",
            Self::IndexList => "index list",
        }
    }

    pub fn url(self, endpoints: &Endpoints) -> &str {
        match self {
            Self::Gainers => &endpoints.top_gainers,
            Self::Losers => &endpoints.top_losers,
            Self::Volume => &endpoints.top_volume,
            Self::MostActive => &endpoints.most_active,
            Self::AdvancesDeclines => &endpoints.advances_declines,
            Self::IndexList => &endpoints.index_list,
        }
    }
}

impl Display for TopList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopList {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|list| list.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ValidationError::UnknownTopList {
                value: value.to_owned(),
            })
    }
}

/// Records of one batch-statistics list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopListing {
    pub list: TopList,
    pub records: Vec<QuoteRecord>,
}

type ListCache = CacheManager<TopList, Vec<QuoteRecord>>;

#[derive(Debug)]
pub struct MarketStats {
    scraper: Scraper,
    endpoints: Endpoints,
    gainers: ListCache,
    losers: ListCache,
    volume: ListCache,
    most_active: ListCache,
    advances_declines: ListCache,
    index_list: ListCache,
}

impl MarketStats {
    pub fn new(
        scraper: Scraper,
        endpoints: Endpoints,
        policy: Arc<dyn CachePolicy>,
        cache_capacity: usize,
    ) -> Self {
        let cache = |name| CacheManager::new(name, cache_capacity, Arc::clone(&policy));
        Self {
            scraper,
            endpoints,
            gainers: cache("top_gainers"),
            losers: cache("top_losers"),
            volume: cache("top_volume"),
            most_active: cache("most_active"),
            advances_declines: cache("advances_declines"),
            index_list: cache("index_list"),
        }
    }

    fn cache(&self, list: TopList) -> &ListCache {
        match list {
            TopList::Gainers => &self.gainers,
            TopList::Losers => &self.losers,
            TopList::Volume => &self.volume,
            TopList::MostActive => &self.most_active,
            TopList::AdvancesDeclines => &self.advances_declines,
            TopList::IndexList => &self.index_list,
        }
    }

    /// Normalized rows of `list`'s `data` array.
    pub async fn top(&self, list: TopList) -> Result<Vec<QuoteRecord>, NseError> {
        self.cache(list)
            .get_or_compute(list, || self.scrape_list(list))
            .await
    }

    async fn scrape_list(&self, list: TopList) -> Result<Vec<QuoteRecord>, NseError> {
        let url = list.url(&self.endpoints);
        let document = self.scraper.fetch_json(url).await?;
        let rows = document
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| NseError::malformed(format!("{url}: document has no data array")))?;
        normalize_all(rows)
    }

    /// Names of every published index.
    pub async fn index_list(&self) -> Result<Vec<String>, NseError> {
        Ok(self
            .top(TopList::IndexList)
            .await?
            .iter()
            .filter_map(|record| record.get_str(INDEX_NAME_FIELD).map(str::to_owned))
            .collect())
    }

    pub async fn is_valid_index(&self, code: &str) -> Result<bool, NseError> {
        Ok(self.index_quote(code).await?.is_some())
    }

    /// Snapshot of the index named `code`, matched case-insensitively.
    pub async fn index_quote(&self, code: &str) -> Result<Option<QuoteRecord>, NseError> {
        let wanted = code.trim();
        Ok(self
            .top(TopList::IndexList)
            .await?
            .into_iter()
            .find(|record| {
                record
                    .get_str(INDEX_NAME_FIELD)
                    .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
            }))
    }
}
