//! Codecs that turn cached values into raw store strings and back
//!
//! The built-in codec set is closed: `text` and `json`. Callers with other
//! formats implement [`Codec`] themselves and hand it to the handler.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{BoxError, StashError};
use crate::value::Value;

/// Encodes and decodes the values of one handler
pub trait Codec: Send + Sync {
    /// Converts a value into the raw string written to the store
    fn encode(&self, key: &str, value: &Value) -> Result<String, BoxError>;

    /// Converts a raw string read from the store back into a value
    fn decode(&self, key: &str, raw: &str) -> Result<Value, BoxError>;
}

/// Built-in codec families selectable by tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// Raw strings stored verbatim
    Text,
    /// Values stored as serialized JSON
    Json,
}

impl CodecKind {
    /// Returns the tag used in handler files
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecKind::Text => "text",
            CodecKind::Json => "json",
        }
    }

    /// Returns the canonical codec for this family
    pub fn codec(&self) -> Arc<dyn Codec> {
        match self {
            CodecKind::Text => Arc::new(TextCodec),
            CodecKind::Json => Arc::new(JsonCodec),
        }
    }
}

impl FromStr for CodecKind {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(CodecKind::Text),
            "json" => Ok(CodecKind::Json),
            _ => Err(StashError::UnknownCodec(s.to_string())),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stores strings as-is
///
/// Non-string values are written in their JSON form and read back as strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn encode(&self, _key: &str, value: &Value) -> Result<String, BoxError> {
        Ok(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    fn decode(&self, _key: &str, raw: &str) -> Result<Value, BoxError> {
        Ok(Value::String(raw.to_string()))
    }
}

/// Stores values as compact JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, _key: &str, value: &Value) -> Result<String, BoxError> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, _key: &str, raw: &str) -> Result<Value, BoxError> {
        Ok(serde_json::from_str(raw)?)
    }
}
