//! Lenient decoding of REST response bodies.
//!
//! The API sometimes answers with non-JSON text, and some identifiers
//! overflow a JSON number's safe precision. Bodies are therefore scrubbed
//! textually first, then parsed, and kept as raw text when parsing fails.

use std::borrow::Cow;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

/// `"id":<digits>,"created_at"`: an id immediately followed by a timestamp.
static LARGE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""id":(\d+),"created_at""#).expect("static regex")
});

/// Suffix the API uses for millisecond-precision UTC timestamps.
const MILLIS_UTC_SUFFIX: &str = ".000Z";

/// A decoded response body.
///
/// `.000Z` timestamps stay strings here: `Value` has no date type. They
/// become `DateTime<Utc>` when a typed model is decoded (fields using
/// `models::api_date`) or on demand through [`revive_date`].
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    /// Body was not valid JSON; kept verbatim (after scrubbing).
    Raw(String),
}

impl Body {
    /// Scrub large identifiers, then parse; fall back to raw text.
    pub fn decode(raw: &str) -> Self {
        let scrubbed = scrub_ids(raw);
        match serde_json::from_str::<Value>(&scrubbed) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Raw(scrubbed.into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// `error` envelope on an otherwise successful response, if present.
    ///
    /// Returns the numeric `status` (the API sends it as a string or a
    /// number) and a human-readable message.
    pub fn error_envelope(&self) -> Option<(Option<u16>, String)> {
        let value = self.as_json()?;
        let error = value.get("error")?;
        if !is_truthy(error) {
            return None;
        }
        let status = value.get("status").and_then(|s| match s {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let message = match error {
            Value::String(s) => s.clone(),
            other => value
                .get("error_description")
                .and_then(Value::as_str)
                .map_or_else(|| other.to_string(), String::from),
        };
        Some((status, message))
    }

    /// Deserialize into a typed model.
    pub fn decode_into<T: DeserializeOwned>(&self) -> Result<T, Error> {
        match self {
            Self::Json(value) => {
                serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body: value.to_string(),
                })
            }
            Self::Raw(text) => Err(Error::Deserialization {
                message: "response body is not JSON".into(),
                body: text.clone(),
            }),
        }
    }
}

/// Quote ids that are immediately followed by `created_at`.
///
/// Purely textual; must run before JSON parsing or the digits are lost.
pub fn scrub_ids(raw: &str) -> Cow<'_, str> {
    LARGE_ID.replace_all(raw, r#""id":"$1","created_at""#)
}

/// Parse a timestamp the API marks as millisecond-precision UTC.
///
/// Only strings ending in `.000Z` qualify; anything else stays a string.
pub fn revive_date(value: &str) -> Option<DateTime<Utc>> {
    if !value.ends_with(MILLIS_UTC_SUFFIX) {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}
