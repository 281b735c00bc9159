//! # Flow: named binding of a source to a decoder and a receiver.
//!
//! ```text
//! Ingester (engine) ──► Decoder ──► EventReceiver
//!        ▲
//!        └── demultiplexed by flow name
//! ```
//!
//! A [`Flow`] is immutable once built. The engine shares it (`Arc<Flow>`)
//! between the flow's source and every shard worker that handles one of its
//! batches.

use std::fmt;

use crate::config::ConfigProperties;
use crate::error::IngestError;
use crate::flows::decoder::DecoderRef;
use crate::flows::receiver::ReceiverRef;

/// Immutable flow binding.
pub struct Flow {
    name: String,
    ingester: String,
    decoder_class: String,
    decoder: DecoderRef,
    receiver_name: String,
    receiver: ReceiverRef,
    properties: ConfigProperties,
}

impl Flow {
    /// Starts building a flow owned by the named ingester.
    pub fn builder(name: impl Into<String>, ingester: impl Into<String>) -> FlowBuilder {
        FlowBuilder::new(name, ingester)
    }

    /// Flow name, unique among the active flows of one engine.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the ingester that owns this flow.
    pub fn ingester_name(&self) -> &str {
        &self.ingester
    }

    pub fn decoder_class(&self) -> &str {
        &self.decoder_class
    }

    pub fn decoder(&self) -> &DecoderRef {
        &self.decoder
    }

    pub fn receiver_name(&self) -> &str {
        &self.receiver_name
    }

    pub fn receiver(&self) -> &ReceiverRef {
        &self.receiver
    }

    /// Merged configuration visible to the decoder and the source.
    pub fn properties(&self) -> &ConfigProperties {
        &self.properties
    }

    /// Textual redefinition of the flow.
    pub fn definition(&self) -> String {
        format!(
            "CREATE FLOW {} FROM {} DECODER '{}' INTO {}",
            self.name, self.ingester, self.decoder_class, self.receiver_name
        )
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.definition())
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("ingester", &self.ingester)
            .field("decoder_class", &self.decoder_class)
            .field("receiver_name", &self.receiver_name)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Flow`] with fluent API.
pub struct FlowBuilder {
    name: String,
    ingester: String,
    decoder: Option<(String, DecoderRef)>,
    receiver: Option<(String, ReceiverRef)>,
    properties: ConfigProperties,
}

impl FlowBuilder {
    pub fn new(name: impl Into<String>, ingester: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ingester: ingester.into(),
            decoder: None,
            receiver: None,
            properties: ConfigProperties::new(),
        }
    }

    pub fn decoder(mut self, class: impl Into<String>, decoder: DecoderRef) -> Self {
        self.decoder = Some((class.into(), decoder));
        self
    }

    /// Binds the receiver; the receiver name is taken from the receiver itself.
    pub fn receiver(mut self, receiver: ReceiverRef) -> Self {
        self.receiver = Some((receiver.name().to_string(), receiver));
        self
    }

    pub fn properties(mut self, properties: ConfigProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Builds the flow. Fails if the name is empty or a binding is missing.
    pub fn build(self) -> Result<Flow, IngestError> {
        let FlowBuilder {
            name,
            ingester,
            decoder,
            receiver,
            properties,
        } = self;
        let invalid = |reason: &str| IngestError::InvalidFlow {
            name: name.clone(),
            reason: reason.to_string(),
        };
        if name.trim().is_empty() {
            return Err(invalid("empty flow name"));
        }
        let (decoder_class, decoder) = decoder.ok_or_else(|| invalid("no decoder"))?;
        let (receiver_name, receiver) = receiver.ok_or_else(|| invalid("no receiver"))?;

        Ok(Flow {
            name,
            ingester,
            decoder_class,
            decoder,
            receiver_name,
            receiver,
            properties,
        })
    }
}
