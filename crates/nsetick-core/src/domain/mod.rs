//! Domain types shared by every component.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated, upper-cased trading symbol |
//! | [`QuoteRecord`] | Normalized scraped record |
//! | [`MarketState`] | Open/closed fact with its provenance |

mod market;
mod record;
mod symbol;

pub use market::{MarketState, MarketStatus, Provenance};
pub use record::QuoteRecord;
pub use symbol::Symbol;
