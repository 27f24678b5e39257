use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Whether continuous trading is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    #[default]
    Unknown,
    Open,
    Closed,
}

impl MarketStatus {
    pub const fn from_open(open: bool) -> Self {
        if open {
            Self::Open
        } else {
            Self::Closed
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl Display for MarketStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a [`MarketStatus`] was established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    None,
    /// Computed from the holiday calendar and the trading window.
    Calendar,
    /// Inferred from a fetched quote's closing price.
    LiveQuote,
}

/// Process-local market state; never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    pub status: MarketStatus,
    pub provenance: Provenance,
}

impl MarketState {
    pub const fn new(status: MarketStatus, provenance: Provenance) -> Self {
        Self { status, provenance }
    }

    pub const fn is_open(self) -> bool {
        matches!(self.status, MarketStatus::Open)
    }

    pub const fn is_live(self) -> bool {
        matches!(self.provenance, Provenance::LiveQuote)
    }
}
