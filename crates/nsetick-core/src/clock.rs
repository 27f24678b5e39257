//! Market open/closed determination.
//!
//! The calendar view combines the holiday set with the continuous trading
//! window (exclusive at both ends) in exchange time. A live signal from a
//! fetched quote's closing price overrides the calendar for the rest of the
//! process: an unsettled (zero) close means trading is still under way.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use time::macros::{offset, time};
use time::{OffsetDateTime, Time, UtcOffset};
use tracing::{info, warn};

use crate::cache::CachePolicy;
use crate::calendar::HolidayCalendar;
use crate::domain::{MarketState, MarketStatus, Provenance};
use crate::error::NseError;

/// India Standard Time.
pub const EXCHANGE_OFFSET: UtcOffset = offset!(+5:30);

/// Continuous trading window in exchange time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingSession {
    pub open: Time,
    pub close: Time,
}

impl TradingSession {
    /// Both boundaries count as closed.
    pub fn contains(&self, at: Time) -> bool {
        self.open < at && at < self.close
    }
}

impl Default for TradingSession {
    fn default() -> Self {
        Self {
            open: time!(09:15),
            close: time!(15:30),
        }
    }
}

#[derive(Debug)]
pub struct MarketClock {
    calendar: Arc<HolidayCalendar>,
    session: TradingSession,
    state: RwLock<MarketState>,
}

impl MarketClock {
    pub fn new(calendar: Arc<HolidayCalendar>) -> Self {
        Self::with_session(calendar, TradingSession::default())
    }

    pub fn with_session(calendar: Arc<HolidayCalendar>, session: TradingSession) -> Self {
        Self {
            calendar,
            session,
            state: RwLock::new(MarketState::default()),
        }
    }

    pub fn state(&self) -> MarketState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the market is open at `now`.
    ///
    /// A live signal recorded by [`MarketClock::observe_close_price`] wins
    /// over the calendar.
    pub async fn is_open(&self, now: OffsetDateTime) -> Result<bool, NseError> {
        let current = self.state();
        if current.is_live() {
            return Ok(current.is_open());
        }

        let open = self.is_open_by_calendar(now).await?;
        self.record(MarketState::new(
            MarketStatus::from_open(open),
            Provenance::Calendar,
        ));
        Ok(open)
    }

    pub async fn is_open_now(&self) -> Result<bool, NseError> {
        self.is_open(OffsetDateTime::now_utc()).await
    }

    /// Calendar answer, ignoring any live signal.
    pub async fn is_open_by_calendar(&self, now: OffsetDateTime) -> Result<bool, NseError> {
        let local = now.to_offset(EXCHANGE_OFFSET);
        let holidays = self.calendar.trading_holidays(local.date()).await?;
        if holidays.contains(&local.date()) {
            return Ok(false);
        }
        Ok(self.session.contains(local.time()))
    }

    /// Records the live signal carried by a quote's closing price.
    pub fn observe_close_price(&self, close: f64) {
        let status = MarketStatus::from_open(close == 0.0);
        self.record(MarketState::new(status, Provenance::LiveQuote));
    }

    fn record(&self, next: MarketState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // Once live, only another live observation may replace the state.
        if state.is_live() && !next.is_live() {
            return;
        }
        if *state != next {
            info!(
                status = %next.status,
                provenance = ?next.provenance,
                "market state changed"
            );
        }
        *state = next;
    }
}

impl CachePolicy for MarketClock {
    fn allows_caching<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            match self.is_open_now().await {
                Ok(open) => !open,
                Err(error) => {
                    warn!(error = %error, "market clock unavailable; caching disabled");
                    false
                }
            }
        })
    }
}
