//! # Lifecycle bus.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from many places (engine, sources, shard workers).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                   Listener (one):
//!   Engine   ──┐
//!   Source N ──┼──────► Bus ───────► engine listener ────► SubscriberSet
//!   Worker N ──┘  (broadcast chan)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: one ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if nobody is subscribed at send time.

use tokio::sync::broadcast;

use super::event::LifecycleEvent;

/// Broadcast channel for lifecycle events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<LifecycleEvent>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: LifecycleEvent) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleKind;

    #[tokio::test]
    async fn subscribers_see_later_events_only() {
        let bus = Bus::new(4);
        bus.publish(LifecycleEvent::new(LifecycleKind::FlowAdded));

        let mut rx = bus.subscribe();
        bus.publish(LifecycleEvent::new(LifecycleKind::FlowRemoved));
        assert_eq!(rx.recv().await.unwrap().kind, LifecycleKind::FlowRemoved);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        Bus::new(0).publish(LifecycleEvent::new(LifecycleKind::ShutdownRequested));
    }
}
