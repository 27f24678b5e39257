//! # nsetick Core
//!
//! Scraping client for National Stock Exchange of India market data.
//!
//! ## Overview
//!
//! The exchange publishes quotes, symbol lists and statistics through
//! undocumented web pages. This crate turns them into typed records:
//!
//! - **Market clock** combining the holiday calendar, trading hours and
//!   live quote signals
//! - **Symbol catalog** with atomically replaced snapshots
//! - **Concurrent quote fetching** with partial-failure reporting
//! - **Normalization** of display strings into numbers and nulls
//! - **Caches** that stay cold while the market is open
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Bounded LRU caches and cache policies |
//! | [`calendar`] | Trading holiday calendar |
//! | [`catalog`] | Symbol universe |
//! | [`client`] | `NseClient` facade and builder |
//! | [`clock`] | Market open/closed determination |
//! | [`config`] | Endpoints, headers and limits |
//! | [`domain`] | Symbols, records and market state |
//! | [`error`] | Error types |
//! | [`extract`] | Embedded payload extraction |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`normalize`] | Record normalization and JSON rendering |
//! | [`quotes`] | Quote and peer fetching |
//! | [`scrape`] | Header and status handling for scrapes |
//! | [`stats`] | Top lists and index snapshots |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nsetick_core::NseClientBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = NseClientBuilder::from_env()?.build();
//!
//!     let batch = client.quotes(&["INFY", "TCS"], false).await?;
//!     if let Some(batch) = batch.native() {
//!         for quote in batch.quotes.iter().flatten() {
//!             println!("{:?}", quote.get_f64("lastPrice"));
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  NseClient      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ QuoteFetcher /  │────▶│ CacheManager     │
//! │ MarketStats     │     │ (MarketClock)    │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Scraper         │────▶│ HTTP Client      │
//! │ (headers, 2xx)  │     │ (reqwest/script) │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ extract +       │
//! │ normalize       │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Operations return [`NseError`], classified by kind:
//!
//! ```rust
//! use nsetick_core::{NseError, NseErrorKind};
//!
//! fn handle_error(error: NseError) {
//!     match error.kind() {
//!         NseErrorKind::Transport => {
//!             // Upstream unreachable; nothing is retried internally
//!         }
//!         NseErrorKind::MalformedResponse => {
//!             // Page layout changed
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! Symbols that are not listed are not errors: they read as `None`.

pub mod cache;
pub mod calendar;
pub mod catalog;
pub mod client;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod http_client;
pub mod normalize;
pub mod quotes;
pub mod scrape;
pub mod stats;

// Caching
pub use cache::{CacheManager, CachePolicy, FixedPolicy, LruStore};

// Market calendar and clock
pub use calendar::{HolidayCalendar, HolidayTable};
pub use clock::{MarketClock, TradingSession, EXCHANGE_OFFSET};

// Symbols
pub use catalog::{CatalogSnapshot, SymbolCatalog};

// Facade
pub use client::{NseClient, NseClientBuilder};
pub use config::{Endpoints, NseConfig};

// Domain
pub use domain::{MarketState, MarketStatus, Provenance, QuoteRecord, Symbol};

// Errors
pub use error::{NseError, NseErrorKind, ValidationError};

// Transport
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient, ScriptedHttpClient,
};

// Data
pub use normalize::{normalize, Rendered};
pub use quotes::{QuoteBatch, QuoteFailure, QuoteFetcher};
pub use scrape::Scraper;
pub use stats::{MarketStats, TopList, TopListing};
