//! Exchange holiday calendar scraped from the market timings page.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use regex::Regex;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Weekday};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::cache::LruStore;
use crate::error::NseError;
use crate::scrape::Scraper;

/// Days whose holiday set is kept; enough to span a date rollover.
const MEMO_CAPACITY: usize = 2;

static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("row pattern is valid"));
static CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>").expect("cell pattern is valid")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

const DAY_FIRST_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[day padding:none]-[month repr:short case_sensitive:false]-[year]"),
    format_description!("[day padding:none]-[month repr:long case_sensitive:false]-[year]"),
    format_description!("[day padding:none] [month repr:short case_sensitive:false] [year]"),
    format_description!("[day padding:none] [month repr:long case_sensitive:false] [year]"),
    format_description!("[day padding:none]-[month padding:none]-[year]"),
    format_description!("[day padding:none]/[month padding:none]/[year]"),
];

/// Non-trading dates for the current year, memoized per calendar day.
#[derive(Debug)]
pub struct HolidayCalendar {
    scraper: Scraper,
    url: String,
    memo: Mutex<LruStore<Date, Arc<BTreeSet<Date>>>>,
    refresh: AsyncMutex<Option<FailedLoad>>,
    finished_loads: AtomicU64,
}

/// Most recent failed load, shared with callers that queued behind it.
#[derive(Debug)]
struct FailedLoad {
    day: Date,
    load: u64,
    error: NseError,
}

impl HolidayCalendar {
    pub fn new(scraper: Scraper, url: impl Into<String>) -> Self {
        Self {
            scraper,
            url: url.into(),
            memo: Mutex::new(LruStore::new(MEMO_CAPACITY)),
            refresh: AsyncMutex::new(None),
            finished_loads: AtomicU64::new(0),
        }
    }

    /// Holidays and remaining weekends from `today` to the end of its year.
    ///
    /// Failures propagate and are not memoized. Callers waiting on a load
    /// that fails receive its error rather than starting another download.
    pub async fn trading_holidays(&self, today: Date) -> Result<Arc<BTreeSet<Date>>, NseError> {
        if let Some(cached) = self.memoized(today) {
            return Ok(cached);
        }

        let seen = self.finished_loads.load(Ordering::Acquire);
        let mut last_failure = self.refresh.lock().await;
        if let Some(cached) = self.memoized(today) {
            debug!(%today, "holiday calendar reused");
            return Ok(cached);
        }
        if let Some(failed) = last_failure
            .as_ref()
            .filter(|failed| failed.day == today && failed.load > seen)
        {
            debug!(%today, "holiday calendar failure shared with waiter");
            return Err(failed.error.clone());
        }

        let outcome = self.load(today).await;
        let load = self.finished_loads.fetch_add(1, Ordering::AcqRel) + 1;
        match outcome {
            Ok(dates) => {
                *last_failure = None;
                self.memo
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(today, Arc::clone(&dates));
                Ok(dates)
            }
            Err(error) => {
                warn!(%today, error = %error, "holiday calendar unavailable");
                *last_failure = Some(FailedLoad {
                    day: today,
                    load,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    async fn load(&self, today: Date) -> Result<Arc<BTreeSet<Date>>, NseError> {
        let page = self.scraper.fetch(&self.url).await?;
        let table = parse_holiday_table(&page, today);
        if table.rows == 0 {
            return Err(NseError::malformed(format!("{}: no holiday rows found", self.url)));
        }

        let mut dates = table.holidays;
        let explicit = dates.len();
        dates.extend(remaining_weekends(today));
        info!(
            %today,
            rows = table.rows,
            explicit,
            total = dates.len(),
            "holiday calendar loaded"
        );
        Ok(Arc::new(dates))
    }

    fn memoized(&self, today: Date) -> Option<Arc<BTreeSet<Date>>> {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&today)
    }
}

/// Trading holidays read from the timings page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayTable {
    /// Rows in the leading serial run, before any date filtering.
    pub rows: usize,
    /// Listed holidays from `today` through 31 December.
    pub holidays: BTreeSet<Date>,
}

/// Extracts the trading-holiday run from the timings page.
///
/// Only the first strictly increasing run of serial numbers is read; the
/// clearing-holiday table that follows restarts at 1 and is ignored. Dates
/// before `today` or outside its year are dropped from `holidays` but still
/// count towards `rows`.
pub fn parse_holiday_table(html: &str, today: Date) -> HolidayTable {
    let mut table = HolidayTable::default();
    let mut last_serial: Option<u32> = None;

    for row in ROW.captures_iter(html) {
        let cells: Vec<String> = CELL
            .captures_iter(&row[1])
            .map(|cell| clean_cell(&cell[1]))
            .collect();
        if cells.len() < 2 {
            continue;
        }

        let Ok(serial) = cells[0].trim_end_matches('.').parse::<u32>() else {
            continue;
        };
        let Some(date) = parse_day_first(&cells[1]) else {
            continue;
        };

        if last_serial.is_some_and(|last| serial <= last) {
            break;
        }
        last_serial = Some(serial);
        table.rows += 1;

        if date.year() == today.year() && date >= today {
            table.holidays.insert(date);
        }
    }

    table
}

/// Every Saturday and Sunday from `today` through 31 December.
pub fn remaining_weekends(today: Date) -> Vec<Date> {
    let mut weekends = Vec::new();
    let mut cursor = Some(today);

    while let Some(date) = cursor {
        if date.year() != today.year() {
            break;
        }
        if matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday) {
            weekends.push(date);
        }
        cursor = date.next_day();
    }

    weekends
}

fn parse_day_first(text: &str) -> Option<Date> {
    DAY_FIRST_FORMATS
        .iter()
        .find_map(|format| Date::parse(text, *format).ok())
}

fn clean_cell(raw: &str) -> String {
    let text = TAG.replace_all(raw, " ");
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"");
    decoded
        .replace(',', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
