//! # Data model: raw payloads and structured events.
//!
//! - [`RawEvent`] - opaque payload as pulled from an external source
//! - [`Event`] - structured record produced by a [`Decoder`](crate::Decoder)

mod event;
mod raw;

pub use event::Event;
pub use raw::RawEvent;
