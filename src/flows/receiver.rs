//! # Event receivers.
//!
//! An [`EventReceiver`] is where decoded events end up: a table that stores
//! them, or a filter that reshapes them and sends them on. Receivers are
//! looked up by name in a [`ReceiverDirectory`] when flows are assembled.
//!
//! [`ChannelReceiver`] is the forwarding kind: it pushes every event into a
//! bounded tokio channel for someone else to consume.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ReceiverError;
use crate::model::Event;

/// # Sink for structured events.
///
/// ### Implementation requirements
/// - `submit_event` may be called concurrently from several shard workers.
/// - Errors are logged by the engine and cost only that event.
/// - `flush` persists pending state; it must not block new submissions.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use flowvisor::{Event, EventReceiver, ReceiverError};
///
/// struct Discard;
///
/// #[async_trait]
/// impl EventReceiver for Discard {
///     fn name(&self) -> &str { "discard" }
///
///     async fn submit_event(&self, _event: Event) -> Result<(), ReceiverError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventReceiver: Send + Sync + 'static {
    /// Unique name within a [`ReceiverDirectory`].
    fn name(&self) -> &str;

    /// Stores or forwards one event.
    async fn submit_event(&self, event: Event) -> Result<(), ReceiverError>;

    /// Flushes pending updates. Default: nothing to flush.
    async fn flush(&self) -> Result<(), ReceiverError> {
        Ok(())
    }
}

/// Shared receiver handle.
pub type ReceiverRef = Arc<dyn EventReceiver>;

/// Name → receiver lookup table.
#[derive(Default, Clone)]
pub struct ReceiverDirectory {
    receivers: HashMap<String, ReceiverRef>,
}

impl ReceiverDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a receiver under its own name, replacing any previous one.
    pub fn register(&mut self, receiver: ReceiverRef) -> Option<ReceiverRef> {
        self.receivers.insert(receiver.name().to_string(), receiver)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, receiver: ReceiverRef) -> Self {
        self.register(receiver);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<ReceiverRef> {
        self.receivers.get(name).cloned()
    }

    /// Sorted receiver names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.receivers.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}

impl fmt::Debug for ReceiverDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverDirectory")
            .field("receivers", &self.names())
            .finish()
    }
}

/// Forwards events into a bounded channel.
///
/// Submission waits for channel space up to `send_timeout`, then fails with
/// [`ReceiverError::Timeout`]; a dropped consumer yields [`ReceiverError::Closed`].
pub struct ChannelReceiver {
    name: String,
    tx: mpsc::Sender<Event>,
    send_timeout: Duration,
}

impl ChannelReceiver {
    /// Creates the receiver and the consuming end of its channel.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let receiver = Self {
            name: name.into(),
            tx,
            send_timeout: Duration::from_secs(1),
        };
        (receiver, rx)
    }

    /// Overrides how long a submission may wait for channel space.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Creates the receiver as a shared handle plus the consuming end.
    pub fn arc(name: impl Into<String>, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Event>) {
        let (receiver, rx) = Self::new(name, capacity);
        (Arc::new(receiver), rx)
    }
}

#[async_trait]
impl EventReceiver for ChannelReceiver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_event(&self, event: Event) -> Result<(), ReceiverError> {
        match self.tx.send_timeout(event, self.send_timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                Err(ReceiverError::Timeout(self.send_timeout))
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                Err(ReceiverError::Closed(self.name.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_receiver_forwards() {
        let (recv, mut rx) = ChannelReceiver::new("fwd", 4);
        recv.submit_event(Event::from_string("a")).await.unwrap();
        recv.flush().await.unwrap();
        assert_eq!(rx.recv().await, Some(Event::from_string("a")));
    }

    #[tokio::test]
    async fn channel_receiver_reports_closed_consumer() {
        let (recv, rx) = ChannelReceiver::new("fwd", 1);
        drop(rx);
        let err = recv.submit_event(Event::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "receiver_closed");
    }

    #[tokio::test]
    async fn channel_receiver_times_out_when_full() {
        let (recv, _rx) = ChannelReceiver::new("fwd", 1);
        let recv = recv.with_send_timeout(Duration::from_millis(10));
        recv.submit_event(Event::new()).await.unwrap();
        let err = recv.submit_event(Event::new()).await.unwrap_err();
        assert!(matches!(err, ReceiverError::Timeout(_)));
    }

    #[test]
    fn directory_lookup_by_name() {
        let (a, _rx_a) = ChannelReceiver::arc("a", 1);
        let (b, _rx_b) = ChannelReceiver::arc("b", 1);
        let dir = ReceiverDirectory::new().with(a).with(b);

        assert_eq!(dir.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(dir.lookup("b").map(|r| r.name().to_string()), Some("b".into()));
        assert!(dir.lookup("c").is_none());
    }
}
