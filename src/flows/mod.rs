//! # Flows and their pluggable parts.
//!
//! This module provides the flow-related types:
//! - [`Flow`] - immutable binding of a name to a decoder and a receiver
//! - [`Decoder`] / [`DecoderFn`] / [`DecoderRegistry`] - raw payload → events
//! - [`EventReceiver`] / [`ReceiverDirectory`] / [`ChannelReceiver`] - event sinks
//! - [`FlowDefinition`] - declarative flow resolved against a context

mod decoder;
mod definition;
mod flow;
mod receiver;

pub use decoder::{CONTENT_TYPE_KEY, Decoder, DecoderFn, DecoderRef, DecoderRegistry};
pub use definition::FlowDefinition;
pub use flow::{Flow, FlowBuilder};
pub use receiver::{ChannelReceiver, EventReceiver, ReceiverDirectory, ReceiverRef};
