//! Normalization of loosely-typed scraped records.
//!
//! Upstream payloads encode numbers as display strings (`"1,234.50"`) and
//! missing values as `"-"`. [`normalize`] maps them onto a consistent shape:
//!
//! | Raw value | Normalized |
//! |-----------|------------|
//! | `"-"` | `null` |
//! | `"-1,000.10"` | `-1000.1` |
//! | `"N/A"`, `""` | unchanged |
//! | numbers, booleans, null | unchanged |

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::domain::QuoteRecord;
use crate::error::NseError;

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?[0-9,]*\.?[0-9]*$").expect("numeric pattern is a valid regex")
});

/// Normalizes one scraped record. Pure and idempotent.
pub fn normalize(raw: &Map<String, Value>) -> QuoteRecord {
    raw.iter()
        .map(|(key, value)| (key.to_string(), normalize_field(value)))
        .collect()
}

/// Normalizes a JSON value that must be an object.
pub fn normalize_value(raw: &Value) -> Result<QuoteRecord, NseError> {
    match raw {
        Value::Object(map) => Ok(normalize(map)),
        other => Err(NseError::malformed(format!(
            "expected a JSON object record, found {}",
            json_type(other)
        ))),
    }
}

/// Normalizes every element of a JSON array of records.
pub fn normalize_all(items: &[Value]) -> Result<Vec<QuoteRecord>, NseError> {
    items.iter().map(normalize_value).collect()
}

fn normalize_field(value: &Value) -> Value {
    match value {
        Value::String(text) if text == "-" => Value::Null,
        Value::String(text) => parse_numeric(text)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

fn parse_numeric(text: &str) -> Option<Number> {
    if !text.bytes().any(|byte| byte.is_ascii_digit()) || !NUMERIC.is_match(text) {
        return None;
    }
    let stripped = text.replace(',', "");
    let parsed = stripped.parse::<f64>().ok()?;
    Number::from_f64(parsed)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Output of a read operation honouring the `as_json` flag.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered<T> {
    Native(T),
    Json(String),
}

impl<T> Rendered<T> {
    pub fn native(self) -> Option<T> {
        match self {
            Self::Native(value) => Some(value),
            Self::Json(_) => None,
        }
    }

    pub fn json(self) -> Option<String> {
        match self {
            Self::Native(_) => None,
            Self::Json(text) => Some(text),
        }
    }
}

/// Serializes `data` to a JSON string when `as_json` is set.
pub fn render<T: Serialize>(data: T, as_json: bool) -> Result<Rendered<T>, NseError> {
    if as_json {
        Ok(Rendered::Json(serde_json::to_string(&data)?))
    } else {
        Ok(Rendered::Native(data))
    }
}
