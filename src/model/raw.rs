//! # Raw payloads.
//!
//! Sources hand the engine batches of [`RawEvent`]s without knowing what is
//! inside. Decoders must check what they got: the engine routes every raw
//! item of a flow to that flow's decoder, whatever its content type.

use std::borrow::Cow;

use serde_json::Value;

use crate::error::DecodeError;

/// An undecoded payload.
#[derive(Clone, Debug, PartialEq)]
pub enum RawEvent {
    /// Text payload (a line, a JSON document, ...).
    Text(String),
    /// Binary payload, e.g. a message body.
    Bytes(Vec<u8>),
    /// A payload that arrived already structured.
    Value(Value),
}

impl RawEvent {
    /// Short name of the variant, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            RawEvent::Text(_) => "text",
            RawEvent::Bytes(_) => "bytes",
            RawEvent::Value(_) => "value",
        }
    }

    /// Textual view of the payload.
    ///
    /// Works for `Text` and UTF-8 `Bytes`; anything else is a [`DecodeError`].
    pub fn as_text(&self) -> Result<Cow<'_, str>, DecodeError> {
        match self {
            RawEvent::Text(s) => Ok(Cow::Borrowed(s.as_str())),
            RawEvent::Bytes(b) => Ok(Cow::Borrowed(std::str::from_utf8(b)?)),
            RawEvent::Value(_) => Err(DecodeError::Unsupported { kind: self.kind() }),
        }
    }

    /// Payload size in bytes (serialized length for `Value`).
    pub fn len(&self) -> usize {
        match self {
            RawEvent::Text(s) => s.len(),
            RawEvent::Bytes(b) => b.len(),
            RawEvent::Value(v) => v.to_string().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for RawEvent {
    fn from(s: String) -> Self {
        RawEvent::Text(s)
    }
}

impl From<&str> for RawEvent {
    fn from(s: &str) -> Self {
        RawEvent::Text(s.to_string())
    }
}

impl From<Vec<u8>> for RawEvent {
    fn from(b: Vec<u8>) -> Self {
        RawEvent::Bytes(b)
    }
}

impl From<Value> for RawEvent {
    fn from(v: Value) -> Self {
        RawEvent::Value(v)
    }
}
