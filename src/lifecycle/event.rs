//! # Lifecycle events emitted by the engine, sources and shard workers.
//!
//! The [`LifecycleKind`] enum classifies event types across four categories:
//! - **Flow events**: registration changes (added, rejected, removed)
//! - **Source events**: pull-loop state (started, stopped, failed, stop timeout)
//! - **Data-path events**: per-item trouble (batch dropped, decode/receiver failure)
//! - **Engine events**: stats reports and shutdown phases
//!
//! The [`LifecycleEvent`] struct carries metadata such as timestamps, flow
//! name, shard index and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use flowvisor::{LifecycleEvent, LifecycleKind};
//!
//! let ev = LifecycleEvent::new(LifecycleKind::DecodeFailed)
//!     .with_flow("clicks")
//!     .with_shard(2)
//!     .with_reason("invalid payload: missing ts");
//!
//! assert_eq!(ev.kind, LifecycleKind::DecodeFailed);
//! assert_eq!(ev.flow.as_deref(), Some("clicks"));
//! assert_eq!(ev.shard, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `flow` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `flow` (subscriber name), `reason` ("full" / "closed").
    SubscriberOverflow,

    // === Flow events ===
    /// Flow registered and its source started.
    FlowAdded,

    /// Flow registration rolled back because its source could not start.
    ///
    /// Sets: `flow`, `reason`.
    FlowRejected,

    /// Flow removed from the registry (its source is stopped right after).
    FlowRemoved,

    // === Source events ===
    /// Pull loop spawned.
    SourceStarted,

    /// Pull loop finished after a stop request.
    SourceStopped,

    /// Pull loop terminated by a source error; the flow stays registered.
    ///
    /// Sets: `flow`, `reason`.
    SourceFailed,

    /// Pull loop did not finish within the stop timeout and was aborted.
    SourceStopTimeout,

    // === Data-path events ===
    /// Target shard queue was full (or closed); the batch was discarded.
    ///
    /// Sets: `flow`, `shard`, `count` (items in the batch).
    BatchDropped,

    /// One raw item failed to decode and was skipped.
    ///
    /// Sets: `flow`, `shard`, `reason`.
    DecodeFailed,

    /// Receiver rejected one event.
    ///
    /// Sets: `flow`, `shard`, `reason`.
    ReceiverFailed,

    // === Engine events ===
    /// Throughput report.
    ///
    /// Sets: `count` (raw items processed in total since start).
    StatsReported,

    /// Shutdown started.
    ShutdownRequested,

    /// Worker pool did not stop within its timeout; workers were aborted.
    PoolStopTimeout,

    /// Shutdown finished.
    ShutdownComplete,
}

/// Lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`LifecycleKind`]
#[derive(Clone, Debug)]
pub struct LifecycleEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: LifecycleKind,
    /// Flow (or subscriber) name, if applicable.
    pub flow: Option<Arc<str>>,
    /// Shard index, if applicable.
    pub shard: Option<usize>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Item count (batch size, processed totals).
    pub count: Option<u64>,
}

impl LifecycleEvent {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: LifecycleKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            flow: None,
            shard: None,
            reason: None,
            count: None,
        }
    }

    /// Attaches a flow name.
    #[inline]
    pub fn with_flow(mut self, flow: impl Into<Arc<str>>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    /// Attaches a shard index.
    #[inline]
    pub fn with_shard(mut self, shard: usize) -> Self {
        self.shard = Some(shard);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an item count.
    #[inline]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        LifecycleEvent::new(LifecycleKind::SubscriberOverflow)
            .with_flow(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        LifecycleEvent::new(LifecycleKind::SubscriberPanicked)
            .with_flow(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, LifecycleKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = LifecycleEvent::new(LifecycleKind::FlowAdded);
        let b = LifecycleEvent::new(LifecycleKind::FlowRemoved);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn overflow_helper_sets_fields() {
        let ev = LifecycleEvent::subscriber_overflow("metrics", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.flow.as_deref(), Some("metrics"));
        assert_eq!(ev.reason.as_deref(), Some("full"));
    }
}
