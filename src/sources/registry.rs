//! # Source kinds: which [`Pull`] feeds a flow.
//!
//! A [`SourceRegistry`] maps a source kind (`"kafka"`, `"file"`, `"http"`, ...)
//! to a factory building the [`Pull`] for one flow. A flow picks its kind
//! with the [`SOURCE_KIND_KEY`] property; flows without it use the
//! registry's default kind.
//!
//! ```rust
//! use flowvisor::{IngestError, PullFn, RawEvent, SourceRegistry};
//!
//! let mut sources = SourceRegistry::new("ticker");
//! sources.register("ticker", |_flow| {
//!     Ok(PullFn::boxed(|| async { Ok::<_, IngestError>(vec![RawEvent::from("tick")]) }))
//! });
//! assert!(sources.contains("ticker"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::IngestError;
use crate::flows::Flow;
use crate::sources::Pull;

/// Flow property selecting the source kind.
pub const SOURCE_KIND_KEY: &str = "source";

type PullFactory = Arc<dyn Fn(&Arc<Flow>) -> Result<Box<dyn Pull>, IngestError> + Send + Sync>;

/// Registration table of pull factories, keyed by source kind.
#[derive(Clone)]
pub struct SourceRegistry {
    default_kind: String,
    factories: HashMap<String, PullFactory>,
}

impl SourceRegistry {
    /// Creates an empty registry whose default kind is `default_kind`.
    pub fn new(default_kind: impl Into<String>) -> Self {
        Self {
            default_kind: default_kind.into(),
            factories: HashMap::new(),
        }
    }

    /// Registers (or replaces) the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Arc<Flow>) -> Result<Box<dyn Pull>, IngestError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Arc<Flow>) -> Result<Box<dyn Pull>, IngestError> + Send + Sync + 'static,
    {
        self.register(kind, factory);
        self
    }

    /// Kind used by flows without a `source` property.
    pub fn default_kind(&self) -> &str {
        &self.default_kind
    }

    /// Returns true if `kind` has a factory.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Source kind the flow asks for.
    pub fn kind_for(&self, flow: &Flow) -> String {
        flow.properties()
            .get_str(SOURCE_KIND_KEY)
            .unwrap_or_else(|| self.default_kind.clone())
    }

    /// Builds the pull for `flow`.
    ///
    /// ### Errors
    /// - [`IngestError::UnknownSource`] if no factory matches the flow's kind.
    /// - Whatever the factory returns.
    pub fn create(&self, flow: &Arc<Flow>) -> Result<Box<dyn Pull>, IngestError> {
        let kind = self.kind_for(flow);
        let factory = self
            .factories
            .get(&kind)
            .ok_or_else(|| IngestError::UnknownSource {
                flow: flow.name().to_string(),
                kind: kind.clone(),
            })?;
        factory(flow)
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("default_kind", &self.default_kind)
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProperties;
    use crate::flows::{ChannelReceiver, DecoderFn};
    use crate::model::{Event, RawEvent};
    use crate::sources::PullFn;

    fn flow(name: &str, props: ConfigProperties) -> Arc<Flow> {
        let (recv, _rx) = ChannelReceiver::arc("sink", 1);
        Arc::new(
            Flow::builder(name, "test")
                .decoder("text", DecoderFn::arc(|_raw: &RawEvent| Ok(Vec::<Event>::new())))
                .receiver(recv)
                .properties(props)
                .build()
                .unwrap(),
        )
    }

    fn idle() -> Result<Box<dyn Pull>, IngestError> {
        Ok(PullFn::boxed(|| async { Ok::<_, IngestError>(Vec::new()) }))
    }

    #[test]
    fn picks_kind_from_properties_or_default() {
        let sources = SourceRegistry::new("memory")
            .with("memory", |_| idle())
            .with("kafka", |_| idle());

        let plain = flow("a", ConfigProperties::new());
        assert_eq!(sources.kind_for(&plain), "memory");
        assert!(sources.create(&plain).is_ok());

        let kafka = flow("b", ConfigProperties::new().with(SOURCE_KIND_KEY, "kafka"));
        assert_eq!(sources.kind_for(&kafka), "kafka");
        assert_eq!(sources.kinds(), vec!["kafka".to_string(), "memory".to_string()]);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let sources = SourceRegistry::new("memory").with("memory", |_| idle());
        let f = flow("c", ConfigProperties::new().with(SOURCE_KIND_KEY, "s3"));

        match sources.create(&f) {
            Err(IngestError::UnknownSource { flow, kind }) => {
                assert_eq!(flow, "c");
                assert_eq!(kind, "s3");
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
