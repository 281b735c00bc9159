//! # Flow definitions and their resolution.
//!
//! A [`FlowDefinition`] is the declarative form of a flow: names only. It is
//! resolved into a live [`Flow`] against a [`Context`] (receivers, global
//! config) and a [`DecoderRegistry`] (decoder kinds).
//!
//! ```text
//! FlowDefinition { decoder: "text/csv" | "csv", receiver: "clicks_table", .. }
//!     │
//!     ├─ decoder  ─► registry class, else registry content type ─► build(merged props)
//!     ├─ receiver ─► context.receivers().lookup(name)
//!     └─ props    ─► context.config().merged(local)
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigProperties;
use crate::context::Context;
use crate::error::IngestError;
use crate::flows::decoder::DecoderRegistry;
use crate::flows::flow::Flow;

/// Declarative flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Flow name.
    pub name: String,
    /// Owning ingester name.
    pub ingester: String,
    /// Decoder class name, or a content type claimed by a registered class.
    pub decoder: String,
    /// Receiver name in the context directory.
    pub receiver: String,
    /// Flow-local properties, layered over the global config.
    #[serde(default)]
    pub properties: ConfigProperties,
}

impl FlowDefinition {
    pub fn new(
        name: impl Into<String>,
        ingester: impl Into<String>,
        decoder: impl Into<String>,
        receiver: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ingester: ingester.into(),
            decoder: decoder.into(),
            receiver: receiver.into(),
            properties: ConfigProperties::new(),
        }
    }

    pub fn with_properties(mut self, properties: ConfigProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Resolves names into bound instances.
    pub fn resolve(&self, ctx: &Context, decoders: &DecoderRegistry) -> Result<Flow, IngestError> {
        let invalid = |reason: String| IngestError::InvalidFlow {
            name: self.name.clone(),
            reason,
        };

        let class = if decoders.contains(&self.decoder) {
            self.decoder.as_str()
        } else {
            decoders
                .class_for_content_type(&self.decoder)
                .ok_or_else(|| invalid(format!("unknown decoder '{}'", self.decoder)))?
        };

        let receiver = ctx
            .receivers()
            .lookup(&self.receiver)
            .ok_or_else(|| invalid(format!("unknown receiver '{}'", self.receiver)))?;

        let properties = ctx.config().merged(&self.properties);
        let decoder = decoders
            .build(class, &properties)
            .ok_or_else(|| invalid(format!("unknown decoder '{class}'")))?
            .map_err(|e| invalid(format!("decoder '{class}' rejected its properties: {e}")))?;

        Flow::builder(&self.name, &self.ingester)
            .decoder(class, decoder)
            .receiver(receiver)
            .properties(properties)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::flows::decoder::{DecoderFn, DecoderRef};
    use crate::flows::receiver::{ChannelReceiver, ReceiverDirectory};
    use crate::model::{Event, RawEvent};
    use serde_json::json;

    fn registry() -> DecoderRegistry {
        let mut reg = DecoderRegistry::new();
        reg.register("lines", |props: &ConfigProperties| {
            if props.get_bool("reject", false) {
                return Err(DecodeError::Invalid("rejected".into()));
            }
            let d: DecoderRef = std::sync::Arc::new(
                DecoderFn::new(|raw: &RawEvent| {
                    Ok(raw.as_text()?.lines().map(Event::from_string).collect())
                })
                .with_content_types(["text/plain"]),
            );
            Ok(d)
        });
        reg
    }

    fn context() -> (Context, tokio::sync::mpsc::Receiver<Event>) {
        let (table, rx) = ChannelReceiver::arc("table", 8);
        let cfg = ConfigProperties::from_value(json!({ "batch": 10, "topic": "global" })).unwrap();
        (Context::new(cfg, ReceiverDirectory::new().with(table)), rx)
    }

    #[test]
    fn resolves_by_class_and_merges_properties() {
        let (ctx, _rx) = context();
        let def = FlowDefinition::new("clicks", "kafka", "lines", "table")
            .with_properties(ConfigProperties::new().with("topic", "clicks"));

        let flow = def.resolve(&ctx, &registry()).unwrap();
        assert_eq!(flow.decoder_class(), "lines");
        assert_eq!(flow.receiver_name(), "table");
        assert_eq!(flow.properties().get_string("topic", ""), "clicks");
        assert_eq!(flow.properties().get_i32("batch", 0), 10);
    }

    #[test]
    fn resolves_by_content_type() {
        let (ctx, _rx) = context();
        let def = FlowDefinition::new("clicks", "http", "text/plain; charset=utf-8", "table");
        let flow = def.resolve(&ctx, &registry()).unwrap();
        assert_eq!(flow.decoder_class(), "lines");
    }

    #[test]
    fn unknown_names_are_invalid() {
        let (ctx, _rx) = context();
        let reg = registry();

        let err = FlowDefinition::new("f", "i", "csv", "table")
            .resolve(&ctx, &reg)
            .unwrap_err();
        assert!(err.to_string().contains("unknown decoder 'csv'"));

        let err = FlowDefinition::new("f", "i", "lines", "nowhere")
            .resolve(&ctx, &reg)
            .unwrap_err();
        assert!(err.to_string().contains("unknown receiver 'nowhere'"));

        let err = FlowDefinition::new("f", "i", "lines", "table")
            .with_properties(ConfigProperties::new().with("reject", true))
            .resolve(&ctx, &reg)
            .unwrap_err();
        assert!(err.to_string().contains("rejected its properties"));
    }

    #[test]
    fn definition_deserializes() {
        let def: FlowDefinition = serde_json::from_value(json!({
            "name": "clicks",
            "ingester": "kafka",
            "decoder": "lines",
            "receiver": "table"
        }))
        .unwrap();
        assert!(def.properties.is_empty());
    }
}
