//! # Structured event.
//!
//! An [`Event`] is a map from field name to value. Values are JSON values, so
//! nested maps are allowed (receivers that preprocess events rely on that).
//! Equality is deep and ignores key order.
//!
//! ## Example
//! ```rust
//! use flowvisor::Event;
//! use serde_json::json;
//!
//! let mut a = Event::new();
//! a.insert("user", "ada");
//! a.insert("geo", json!({ "country": "UK" }));
//!
//! let b: Event = [("geo", json!({ "country": "UK" })), ("user", json!("ada"))]
//!     .into_iter()
//!     .collect();
//!
//! assert_eq!(a, b);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the payload of [`Event::from_string`].
pub const EVENT_STRING_KEY: &str = "_event_string";
/// Field holding the payload of [`Event::from_array`].
pub const EVENT_ARRAY_KEY: &str = "_event_array";

/// A single structured event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    data: Map<String, Value>,
}

impl Event {
    /// Creates an empty event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing map.
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Event carrying one string under `_event_string`.
    pub fn from_string(s: impl Into<String>) -> Self {
        let mut ev = Self::new();
        ev.insert(EVENT_STRING_KEY, Value::String(s.into()));
        ev
    }

    /// Event carrying an array under `_event_array`.
    pub fn from_array(values: impl IntoIterator<Item = Value>) -> Self {
        let mut ev = Self::new();
        ev.insert(EVENT_ARRAY_KEY, Value::Array(values.into_iter().collect()));
        ev
    }

    /// Field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterates over fields (order unspecified).
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }
}

impl From<Map<String, Value>> for Event {
    fn from(data: Map<String, Value>) -> Self {
        Self::from_map(data)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Event {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.data) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{:?}", self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_equality_ignores_order() {
        let a: Event = [("x", json!(1)), ("nested", json!({ "a": [1, 2], "b": null }))]
            .into_iter()
            .collect();
        let b: Event = [("nested", json!({ "b": null, "a": [1, 2] })), ("x", json!(1))]
            .into_iter()
            .collect();
        assert_eq!(a, b);

        let c: Event = [("x", json!(1)), ("nested", json!({ "a": [2, 1], "b": null }))]
            .into_iter()
            .collect();
        assert_ne!(a, c);
    }

    #[test]
    fn null_and_missing_differ() {
        let with_null: Event = [("a", json!(null))].into_iter().collect();
        assert_ne!(with_null, Event::new());
    }

    #[test]
    fn string_and_array_helpers() {
        let ev = Event::from_string("raw line");
        assert_eq!(ev.get(EVENT_STRING_KEY), Some(&json!("raw line")));

        let ev = Event::from_array([json!(1), json!("two")]);
        assert_eq!(ev.get(EVENT_ARRAY_KEY), Some(&json!([1, "two"])));
        assert_eq!(ev.len(), 1);
    }

    #[test]
    fn serializes_as_plain_object() {
        let ev: Event = [("user", json!("ada"))].into_iter().collect();
        assert_eq!(ev.to_string(), r#"{"user":"ada"}"#);

        let back: Event = serde_json::from_str(r#"{"user":"ada"}"#).unwrap();
        assert_eq!(back, ev);
    }
}
