//! The percent-encoded JSON envelope that carries the workbook payload.

use std::str::Utf8Error;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Percent-encoded form of `{"workbook"`, the canonical envelope line prefix.
pub const ENVELOPE_PREFIX: &str = "%7B%22workbook%22";

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("malformed percent escape at byte {0}")]
    MalformedEscape(usize),
    #[error("percent-decoded bytes are not UTF-8: {0}")]
    Percent(#[from] Utf8Error),
    #[error("envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope has no string `workbook` field")]
    MissingWorkbook,
}

/// Decoded envelope.  Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 text of the compressed workbook blob, kept verbatim.
    pub workbook:      String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_sheet: Option<String>,
    #[serde(default)]
    pub max_row:       u64,
    #[serde(default)]
    pub max_col:       u64,
    #[serde(default)]
    pub end_row_index: u64,
    #[serde(default)]
    pub end_col_index: u64,
}

// Lenient mirror used for parsing: numeric fields may be null, negative or
// strings in the wild, and `workbook` may be missing.
#[derive(Deserialize)]
struct EnvelopeRaw {
    #[serde(default)]
    workbook:      Option<serde_json::Value>,
    #[serde(default)]
    related_sheet: Option<serde_json::Value>,
    #[serde(default)]
    max_row:       Option<serde_json::Value>,
    #[serde(default)]
    max_col:       Option<serde_json::Value>,
    #[serde(default)]
    end_row_index: Option<serde_json::Value>,
    #[serde(default)]
    end_col_index: Option<serde_json::Value>,
}

fn count(v: Option<serde_json::Value>) -> u64 {
    match v {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

impl Envelope {
    /// Percent-decode `line` and parse it as an envelope.
    ///
    /// Every `%` must start a two-hex-digit escape; a stray `%` is an error
    /// rather than literal text.
    pub fn decode_line(line: &str) -> Result<Self, EnvelopeError> {
        let line = line.trim();
        if let Some(offset) = malformed_escape(line) {
            return Err(EnvelopeError::MalformedEscape(offset));
        }
        let decoded = percent_decode_str(line).decode_utf8()?;
        Self::from_json(&decoded)
    }

    /// Parse an already-decoded JSON envelope.
    pub fn from_json(json: &str) -> Result<Self, EnvelopeError> {
        let raw: EnvelopeRaw = serde_json::from_str(json)?;
        let workbook = match raw.workbook {
            Some(serde_json::Value::String(s)) => s,
            _ => return Err(EnvelopeError::MissingWorkbook),
        };
        let related_sheet = match raw.related_sheet {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };
        Ok(Self {
            workbook,
            related_sheet,
            max_row:       count(raw.max_row),
            max_col:       count(raw.max_col),
            end_row_index: count(raw.end_row_index),
            end_col_index: count(raw.end_col_index),
        })
    }
}

/// Byte offset of the first `%` not followed by two hex digits.
fn malformed_escape(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'%')
        .map(|(i, _)| i)
        .find(|&i| {
            bytes
                .get(i + 1..i + 3)
                .map_or(true, |hex| !hex.iter().all(u8::is_ascii_hexdigit))
        })
}

/// `true` when `line` (already trimmed) looks like an envelope candidate.
pub fn is_candidate(line: &str) -> bool {
    line.starts_with(ENVELOPE_PREFIX) || line.contains("workbook")
}
