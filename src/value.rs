//! Value and expiry model shared by the registry and the coordinator
//!
//! Cached values are `serde_json::Value`s. Plain text is carried as
//! `Value::String`, structured data as objects or arrays. A value can carry
//! its own creation timestamp in a named field, which is how staleness is
//! decided; the store keeps no age metadata of its own.

use chrono::{DateTime, Utc};

pub use serde_json::Value;

/// Returns the current time as whole seconds since the Unix epoch
pub fn epoch_now() -> i64 {
    Utc::now().timestamp()
}

/// How long a cached value stays usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The value never goes stale
    Never,
    /// The value goes stale this many seconds after its timestamp
    After(u64),
}

impl Expiry {
    /// Maps an expiry window in seconds, where `0` means never expires
    pub fn from_seconds(seconds: u64) -> Self {
        if seconds == 0 {
            Expiry::Never
        } else {
            Expiry::After(seconds)
        }
    }
}

/// Whether a decoded value counts as absent
///
/// `null` and the empty string are undefined; `false`, `0` and empty
/// collections are real values.
pub fn is_undefined(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Reads an epoch-seconds timestamp out of `field` of a composite value
///
/// Accepts integer or float numbers, numeric strings and RFC 3339 strings.
/// Returns `None` for non-objects, missing fields, or unparseable contents.
pub fn timestamp_field(value: &Value, field: &str) -> Option<i64> {
    match value.get(field)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc).timestamp())
            })
        }
        _ => None,
    }
}

/// Reads text as JSON when it parses, otherwise as a trimmed string
pub fn parse_loose(text: &str) -> Value {
    let trimmed = text.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// Decides whether a value is still fresh at `now`
///
/// Without an expiry field, or when the value does not expose a readable
/// timestamp in it, there is no age to judge and the value is fresh.
pub fn is_fresh(value: &Value, expiry_field: Option<&str>, expiry: Expiry, now: i64) -> bool {
    let Expiry::After(window) = expiry else {
        return true;
    };
    let Some(field) = expiry_field else {
        return true;
    };
    match timestamp_field(value, field) {
        Some(ts) => now.saturating_sub(ts) < i64::try_from(window).unwrap_or(i64::MAX),
        None => true,
    }
}
