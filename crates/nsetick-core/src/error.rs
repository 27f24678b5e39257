use std::fmt::{Display, Formatter};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::http_client::HttpError;

/// Validation errors for caller-supplied input and configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("unknown list '{value}', expected one of gainers, losers, volume, active, advances decline, index list")]
    UnknownTopList { value: String },

    #[error("invalid value '{value}' for configuration key {key}")]
    InvalidConfig { key: &'static str, value: String },
}

/// Classification of failures surfaced by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NseErrorKind {
    /// Network failure or non-2xx response from the upstream site.
    Transport,
    /// The expected payload was missing or could not be parsed.
    MalformedResponse,
    InvalidRequest,
    Internal,
}

/// Structured client error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NseError {
    kind: NseErrorKind,
    message: String,
}

impl NseError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: NseErrorKind::Transport,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: NseErrorKind::MalformedResponse,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: NseErrorKind::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: NseErrorKind::Internal,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> NseErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            NseErrorKind::Transport => "nse.transport",
            NseErrorKind::MalformedResponse => "nse.malformed_response",
            NseErrorKind::InvalidRequest => "nse.invalid_request",
            NseErrorKind::Internal => "nse.internal",
        }
    }
}

impl Display for NseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for NseError {}

impl Serialize for NseError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("NseError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.message)?;
        state.end()
    }
}

impl From<ValidationError> for NseError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_request(error.to_string())
    }
}

impl From<HttpError> for NseError {
    fn from(error: HttpError) -> Self {
        Self::transport(error.message())
    }
}

impl From<serde_json::Error> for NseError {
    fn from(error: serde_json::Error) -> Self {
        Self::internal(format!("serialization error: {error}"))
    }
}
