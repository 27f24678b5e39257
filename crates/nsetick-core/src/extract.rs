//! Extraction of JSON-like objects embedded in scraped HTML.
//!
//! The quote page hides its payload in `<div id="responseDiv" ...>`. Rather
//! than slicing at fixed offsets, the extractor searches for a landmark
//! token, then scans a brace-balanced object starting at the first `{` after
//! the landmark's tag. String literals (single or double quoted) are skipped
//! while counting braces.
//!
//! The embedded text is JavaScript rather than JSON, so
//! [`translate_literals`] rewrites it before parsing:
//!
//! | Source | JSON |
//! |--------|------|
//! | `True`, `true` | `true` |
//! | `False`, `false` | `false` |
//! | `None`, `none`, `null`, `undefined` | `null` |
//! | `NaN` | `"NaN"` |
//! | `'text'` | `"text"` |

use serde_json::Value;
use thiserror::Error;

use crate::error::NseError;

/// Landmark of the hidden element carrying the quote payload.
pub const QUOTE_LANDMARK: &str = "id=\"responseDiv\"";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("landmark '{landmark}' not found in document")]
    LandmarkNotFound { landmark: String },
    #[error("no embedded object found")]
    NoObject,
    #[error("embedded object starting at byte {start} is not balanced")]
    Unbalanced { start: usize },
    #[error("embedded object is not valid JSON after literal translation: {message}")]
    InvalidPayload { message: String },
}

impl From<ExtractError> for NseError {
    fn from(error: ExtractError) -> Self {
        NseError::malformed(error.to_string())
    }
}

/// Returns the first balanced object after `landmark`.
pub fn embedded_object<'a>(document: &'a str, landmark: &str) -> Result<&'a str, ExtractError> {
    let found = document
        .find(landmark)
        .ok_or_else(|| ExtractError::LandmarkNotFound {
            landmark: landmark.to_owned(),
        })?;
    let mut offset = found + landmark.len();

    // Skip the remainder of the landmark's opening tag.
    if let Some(tag_end) = document[offset..].find('>') {
        offset += tag_end + 1;
    }

    let open = document[offset..]
        .find('{')
        .map(|index| index + offset)
        .ok_or(ExtractError::NoObject)?;
    let end = balanced_end(document, open)?;
    Ok(&document[open..end])
}

/// Returns every top-level balanced object in `document`, in order.
pub fn embedded_objects(document: &str) -> Result<Vec<&str>, ExtractError> {
    let mut objects = Vec::new();
    let mut cursor = 0;

    while let Some(index) = document[cursor..].find('{') {
        let open = cursor + index;
        let end = balanced_end(document, open)?;
        objects.push(&document[open..end]);
        cursor = end;
    }

    Ok(objects)
}

fn balanced_end(text: &str, open: usize) -> Result<usize, ExtractError> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (index, &byte) in text.as_bytes().iter().enumerate().skip(open) {
        if let Some(delimiter) = quote {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == delimiter {
                quote = None;
            }
            continue;
        }

        match byte {
            b'"' | b'\'' => quote = Some(byte),
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(index + 1);
                }
            }
            _ => {}
        }
    }

    Err(ExtractError::Unbalanced { start: open })
}

/// Rewrites JavaScript literal tokens and single-quoted strings into JSON.
/// Text inside double-quoted strings is left untouched.
pub fn translate_literals(block: &str) -> String {
    let mut out = String::with_capacity(block.len() + 16);
    let mut chars = block.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                out.push('"');
                let mut escaped = false;
                for inner in chars.by_ref() {
                    out.push(inner);
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == '"' {
                        break;
                    }
                }
            }
            '\'' => {
                out.push('"');
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(next) => {
                                out.push('\\');
                                out.push(next);
                            }
                            None => out.push('\\'),
                        },
                        '\'' => break,
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" | "true" => "true",
                    "False" | "false" => "false",
                    "None" | "none" | "null" | "undefined" => "null",
                    "NaN" => "\"NaN\"",
                    _ => word.as_str(),
                });
            }
            other => out.push(other),
        }
    }

    out
}

/// Translates and parses an embedded object.
pub fn parse_embedded(block: &str) -> Result<Value, ExtractError> {
    serde_json::from_str(&translate_literals(block)).map_err(|error| {
        ExtractError::InvalidPayload {
            message: error.to_string(),
        }
    })
}
