//! Error types used by the ingestion engine, decoders and receivers.
//!
//! This module defines three error enums:
//!
//! - [`IngestError`]: flow lifecycle failures (registration, sources, shutdown).
//! - [`DecodeError`]: a raw payload could not be turned into events.
//! - [`ReceiverError`]: a receiver failed to store or forward an event.
//!
//! Only [`IngestError`] ever reaches a caller of the engine API. Decode and
//! receiver failures are recovered per item inside the shard workers.
//! All types provide `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by flow lifecycle operations.
///
/// Returned synchronously from [`Engine::add_flow`](crate::Engine::add_flow) and
/// [`Engine::drop_flow`](crate::Engine::drop_flow), or used to terminate a single
/// failing [`FlowSource`](crate::FlowSource).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum IngestError {
    /// A flow with the same name is already registered.
    #[error("a flow named '{name}' already exists")]
    DuplicateFlow {
        /// The conflicting flow name.
        name: String,
    },

    /// No flow with this name is registered.
    #[error("no flow named '{name}' currently exists")]
    FlowNotFound {
        /// The missing flow name.
        name: String,
    },

    /// The flow could not be assembled (missing or unknown decoder/receiver).
    #[error("invalid flow '{name}': {reason}")]
    InvalidFlow {
        /// Flow name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The flow asks for a source kind nobody registered.
    #[error("unknown source kind '{kind}' for flow '{flow}'")]
    UnknownSource {
        /// Flow name.
        flow: String,
        /// Requested source kind.
        kind: String,
    },

    /// Pulling from the external source failed.
    #[error("source of flow '{flow}' failed: {error}")]
    Source {
        /// Flow name.
        flow: String,
        /// The underlying error message.
        error: String,
    },

    /// `start()` was called on a source that already left the `Created` state.
    #[error("source of flow '{flow}' was already started or stopped")]
    AlreadyStarted {
        /// Flow name.
        flow: String,
    },

    /// The engine is shut down and accepts no new flows.
    #[error("engine '{engine}' is shut down")]
    ShutDown {
        /// Engine name.
        engine: String,
    },
}

impl IngestError {
    /// Convenience constructor for [`IngestError::Source`].
    pub fn source_failed(flow: impl Into<String>, error: impl std::fmt::Display) -> Self {
        IngestError::Source {
            flow: flow.into(),
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use flowvisor::IngestError;
    ///
    /// let err = IngestError::DuplicateFlow { name: "clicks".into() };
    /// assert_eq!(err.as_label(), "ingest_duplicate_flow");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            IngestError::DuplicateFlow { .. } => "ingest_duplicate_flow",
            IngestError::FlowNotFound { .. } => "ingest_flow_not_found",
            IngestError::InvalidFlow { .. } => "ingest_invalid_flow",
            IngestError::UnknownSource { .. } => "ingest_unknown_source",
            IngestError::Source { .. } => "ingest_source_failed",
            IngestError::AlreadyStarted { .. } => "ingest_already_started",
            IngestError::ShutDown { .. } => "ingest_shut_down",
        }
    }
}

/// # Errors produced while decoding a raw payload.
///
/// A decode error only ever costs the single raw item that produced it.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload is malformed for this decoder.
    #[error("invalid payload: {0}")]
    Invalid(String),

    /// The decoder does not handle this kind of raw payload.
    #[error("cannot decode a {kind} payload")]
    Unsupported {
        /// Kind of the raw payload (`text`, `bytes`, `value`).
        kind: &'static str,
    },

    /// Byte payload is not valid UTF-8.
    #[error("payload is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The decoder panicked; the worker caught it.
    #[error("decoder panicked: {0}")]
    Panicked(String),
}

impl DecodeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DecodeError::Invalid(_) => "decode_invalid",
            DecodeError::Unsupported { .. } => "decode_unsupported",
            DecodeError::Utf8(_) => "decode_utf8",
            DecodeError::Panicked(_) => "decode_panicked",
        }
    }
}

/// # Errors produced by an [`EventReceiver`](crate::EventReceiver).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReceiverError {
    /// Storing the event in the back-end failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Event values could not be parsed into the receiver's shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// The receiver no longer accepts events.
    #[error("receiver '{0}' is closed")]
    Closed(String),

    /// The receiver did not accept the event in time.
    #[error("receiver timed out after {0:?}")]
    Timeout(Duration),

    /// The receiver panicked; the worker caught it.
    #[error("receiver panicked: {0}")]
    Panicked(String),
}

impl ReceiverError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReceiverError::Io(_) => "receiver_io",
            ReceiverError::Parse(_) => "receiver_parse",
            ReceiverError::Closed(_) => "receiver_closed",
            ReceiverError::Timeout(_) => "receiver_timeout",
            ReceiverError::Panicked(_) => "receiver_panicked",
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(
            IngestError::FlowNotFound { name: "x".into() }.as_label(),
            "ingest_flow_not_found"
        );
        assert_eq!(DecodeError::Invalid("x".into()).as_label(), "decode_invalid");
        assert_eq!(ReceiverError::Parse("x".into()).as_label(), "receiver_parse");
    }

    #[test]
    fn messages_name_the_flow() {
        let err = IngestError::DuplicateFlow { name: "clicks".into() };
        assert_eq!(err.to_string(), "a flow named 'clicks' already exists");

        let err = IngestError::source_failed("clicks", "connection reset");
        assert_eq!(
            err.to_string(),
            "source of flow 'clicks' failed: connection reset"
        );
    }

    #[test]
    fn panic_payloads_render() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
