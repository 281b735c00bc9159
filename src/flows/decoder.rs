//! # Decoders and the decoder registration table.
//!
//! A [`Decoder`] turns one [`RawEvent`] into zero or more [`Event`]s. The
//! engine calls it from shard workers, possibly from several at once, so it
//! takes `&self` and must be `Send + Sync`.
//!
//! Decoder kinds are not discovered at runtime. They are registered
//! explicitly in a [`DecoderRegistry`] under a class name; the registry also
//! indexes which content types each class claims, so a flow definition can
//! name either.
//!
//! ```text
//! DecoderRegistry
//!   ├─ "csv"  → factory(props) → Arc<dyn Decoder>   claims ["text/csv"]
//!   └─ "json" → factory(props) → Arc<dyn Decoder>   claims ["application/json"]
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ConfigProperties;
use crate::error::DecodeError;
use crate::model::{Event, RawEvent};

/// Property key that carries the content type of an HTTP-submitted payload.
pub const CONTENT_TYPE_KEY: &str = "Content-Type";

/// # Raw payload → events.
///
/// ### Contract
/// - Returns events in the order they should be ingested.
/// - Returns [`DecodeError`] when the payload is invalid; the engine then skips
///   only that raw item.
/// - May be invoked for payloads of a content type it never claimed; validate
///   defensively.
///
/// # Example
/// ```
/// use flowvisor::{Decoder, DecodeError, Event, RawEvent};
///
/// struct Lines;
///
/// impl Decoder for Lines {
///     fn content_types(&self) -> Vec<String> { vec!["text/plain".into()] }
///
///     fn decode(&self, raw: &RawEvent) -> Result<Vec<Event>, DecodeError> {
///         Ok(raw.as_text()?.lines().map(Event::from_string).collect())
///     }
/// }
///
/// let events = Lines.decode(&RawEvent::from("a\nb")).unwrap();
/// assert_eq!(events.len(), 2);
/// ```
pub trait Decoder: Send + Sync + 'static {
    /// Content types this decoder may be registered for.
    ///
    /// Claiming a type is not a promise to decode every payload of it, nor a
    /// guarantee this decoder is the one picked for it.
    fn content_types(&self) -> Vec<String> {
        Vec::new()
    }

    /// Decodes one raw payload.
    fn decode(&self, raw: &RawEvent) -> Result<Vec<Event>, DecodeError>;
}

/// Shared decoder handle.
pub type DecoderRef = Arc<dyn Decoder>;

/// Closure-backed decoder.
///
/// ```rust
/// use flowvisor::{DecoderFn, DecoderRef, Event, RawEvent};
///
/// let d: DecoderRef = DecoderFn::arc(|raw: &RawEvent| {
///     Ok(vec![Event::from_string(raw.as_text()?.into_owned())])
/// });
/// assert_eq!(d.decode(&RawEvent::from("x")).unwrap().len(), 1);
/// ```
pub struct DecoderFn<F> {
    content_types: Vec<String>,
    f: F,
}

impl<F> DecoderFn<F>
where
    F: Fn(&RawEvent) -> Result<Vec<Event>, DecodeError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            content_types: Vec::new(),
            f,
        }
    }

    /// Declares the content types this decoder claims.
    pub fn with_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Creates the decoder and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F> Decoder for DecoderFn<F>
where
    F: Fn(&RawEvent) -> Result<Vec<Event>, DecodeError> + Send + Sync + 'static,
{
    fn content_types(&self) -> Vec<String> {
        self.content_types.clone()
    }

    fn decode(&self, raw: &RawEvent) -> Result<Vec<Event>, DecodeError> {
        (self.f)(raw)
    }
}

impl<F> fmt::Debug for DecoderFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderFn")
            .field("content_types", &self.content_types)
            .finish_non_exhaustive()
    }
}

type DecoderFactory = Arc<dyn Fn(&ConfigProperties) -> Result<DecoderRef, DecodeError> + Send + Sync>;

/// Registration table of decoder kinds.
#[derive(Default, Clone)]
pub struct DecoderRegistry {
    factories: HashMap<String, DecoderFactory>,
    by_content_type: HashMap<String, String>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a decoder kind under `class`.
    ///
    /// The factory is probed once with empty properties to learn which
    /// content types the kind claims. The first class to claim a content type
    /// keeps it. Re-registering a class replaces its factory.
    pub fn register<F>(&mut self, class: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ConfigProperties) -> Result<DecoderRef, DecodeError> + Send + Sync + 'static,
    {
        let class = class.into();
        if let Ok(probe) = factory(&ConfigProperties::new()) {
            for ct in probe.content_types() {
                self.by_content_type
                    .entry(ct.to_ascii_lowercase())
                    .or_insert_with(|| class.clone());
            }
        }
        self.factories.insert(class, Arc::new(factory));
        self
    }

    /// Builds a decoder of kind `class` bound to `props`.
    ///
    /// `None` if the class is unknown.
    pub fn build(
        &self,
        class: &str,
        props: &ConfigProperties,
    ) -> Option<Result<DecoderRef, DecodeError>> {
        self.factories.get(class).map(|factory| factory(props))
    }

    /// Class claiming a content type (case-insensitive, parameters ignored).
    pub fn class_for_content_type(&self, content_type: &str) -> Option<&str> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_ascii_lowercase();
        self.by_content_type.get(&essence).map(String::as_str)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Sorted registered class names.
    pub fn classes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("classes", &self.classes())
            .field("content_types", &self.by_content_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> DecoderRef {
        Arc::new(
            DecoderFn::new(|raw: &RawEvent| {
                Ok(raw.as_text()?.lines().map(Event::from_string).collect())
            })
            .with_content_types(["text/plain"]),
        )
    }

    #[test]
    fn registry_indexes_content_types() {
        let mut reg = DecoderRegistry::new();
        reg.register("lines", |_props: &ConfigProperties| Ok(lines()));

        assert!(reg.contains("lines"));
        assert_eq!(reg.class_for_content_type("text/plain"), Some("lines"));
        assert_eq!(
            reg.class_for_content_type("Text/Plain; charset=utf-8"),
            Some("lines")
        );
        assert_eq!(reg.class_for_content_type("application/json"), None);
    }

    #[test]
    fn first_claim_wins() {
        let mut reg = DecoderRegistry::new();
        reg.register("first", |_props: &ConfigProperties| Ok(lines()));
        reg.register("second", |_props: &ConfigProperties| Ok(lines()));

        assert_eq!(reg.class_for_content_type("text/plain"), Some("first"));
        assert_eq!(reg.classes(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn build_binds_properties() {
        let mut reg = DecoderRegistry::new();
        reg.register("prefixed", |props: &ConfigProperties| {
            let prefix = props.get_string("prefix", "");
            let d: DecoderRef = DecoderFn::arc(move |raw: &RawEvent| {
                Ok(vec![Event::from_string(format!("{prefix}{}", raw.as_text()?))])
            });
            Ok(d)
        });

        let props = ConfigProperties::new().with("prefix", "> ");
        let d = reg.build("prefixed", &props).unwrap().unwrap();
        let out = d.decode(&RawEvent::from("hi")).unwrap();
        assert_eq!(out[0], Event::from_string("> hi"));

        assert!(reg.build("missing", &props).is_none());
    }

    #[test]
    fn decoders_validate_what_they_get() {
        let d = lines();
        assert!(d.decode(&RawEvent::Value(serde_json::json!(1))).is_err());
    }
}
