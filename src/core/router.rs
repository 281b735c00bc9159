//! # Shard router: round-robin, drop-on-full enqueue.
//!
//! Every [`FlowSource`](crate::FlowSource) holds a clone of the engine's
//! [`ShardRouter`] and hands it each non-empty batch it pulls.
//!
//! ```text
//! enqueue(flow, batch)
//!     │
//!     ├─ shard = counter.fetch_add(1) % N       (one global counter, all flows)
//!     └─ queues[shard].try_send((flow, batch))
//!            ├─ Ok     → worker `shard` will process it
//!            └─ Full   → batch discarded, BatchDropped published
//! ```
//!
//! ## Rules
//! - **Never blocks** the producing source and never returns an error to it.
//! - **No affinity**: consecutive batches of one flow land on different shards,
//!   so there is no per-flow ordering; FIFO holds only inside one shard queue.
//! - The counter is shared by the whole engine and injected here explicitly.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use crate::flows::Flow;
use crate::lifecycle::{Bus, LifecycleEvent, LifecycleKind};
use crate::model::RawEvent;

/// One unit of shard work: a flow and a batch of its raw items.
pub(crate) struct Batch {
    pub(crate) flow: Arc<Flow>,
    pub(crate) items: Vec<RawEvent>,
}

/// Round-robin dispatcher over the shard queues.
#[derive(Clone)]
pub struct ShardRouter {
    queues: Arc<[mpsc::Sender<Batch>]>,
    counter: Arc<AtomicU64>,
    bus: Bus,
}

impl ShardRouter {
    /// Creates `shards` bounded queues and the router feeding them.
    ///
    /// Returns the receiving ends, index-aligned with shard numbers.
    pub(crate) fn with_queues(
        shards: usize,
        capacity: usize,
        counter: Arc<AtomicU64>,
        bus: Bus,
    ) -> (Self, Vec<mpsc::Receiver<Batch>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..shards.max(1))
            .map(|_| mpsc::channel::<Batch>(capacity.max(1)))
            .unzip();
        let router = Self {
            queues: senders.into(),
            counter,
            bus,
        };
        (router, receivers)
    }

    /// Number of shards.
    pub fn shards(&self) -> usize {
        self.queues.len()
    }

    /// Picks the next shard: global counter modulo shard count.
    fn next_shard(&self) -> usize {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        (n % self.queues.len() as u64) as usize
    }

    /// Offers a batch to the next shard.
    ///
    /// Returns `true` if the batch was queued. A full (or closed) queue drops
    /// the batch; that is reported on the lifecycle bus, never to the caller
    /// as an error.
    pub fn enqueue(&self, flow: &Arc<Flow>, items: Vec<RawEvent>) -> bool {
        let shard = self.next_shard();
        let len = items.len() as u64;
        let batch = Batch {
            flow: Arc::clone(flow),
            items,
        };

        let reason = match self.queues[shard].try_send(batch) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Full(_)) => "full",
            Err(mpsc::error::TrySendError::Closed(_)) => "closed",
        };

        debug!(flow = %flow.name(), shard, items = len, reason, "shard queue rejected batch, dropped");
        self.bus.publish(
            LifecycleEvent::new(LifecycleKind::BatchDropped)
                .with_flow(flow.name())
                .with_shard(shard)
                .with_count(len)
                .with_reason(reason),
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{ChannelReceiver, DecoderFn};
    use crate::model::Event;
    use std::time::Duration;

    fn flow(name: &str) -> Arc<Flow> {
        let (recv, _rx) = ChannelReceiver::arc("sink", 1);
        let flow = Flow::builder(name, "test")
            .decoder("text", DecoderFn::arc(|_raw: &RawEvent| Ok(Vec::<Event>::new())))
            .receiver(recv)
            .build()
            .unwrap();
        Arc::new(flow)
    }

    #[tokio::test]
    async fn round_robin_is_global_and_exact() {
        let counter = Arc::new(AtomicU64::new(0));
        let (router, mut queues) = ShardRouter::with_queues(3, 16, counter, Bus::new(8));
        let a = flow("a");
        let b = flow("b");

        for i in 0..7 {
            let f = if i % 2 == 0 { &a } else { &b };
            assert!(router.enqueue(f, vec![RawEvent::from(format!("{i}"))]));
        }

        let mut seen = Vec::new();
        for (shard, q) in queues.iter_mut().enumerate() {
            while let Ok(batch) = q.try_recv() {
                let tag = batch.items[0].as_text().unwrap().into_owned();
                seen.push((shard, tag.parse::<usize>().unwrap()));
            }
        }
        seen.sort_by_key(|(_, i)| *i);
        let shards: Vec<usize> = seen.iter().map(|(s, _)| *s).collect();
        assert_eq!(shards, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let bus = Bus::new(8);
        let mut events = bus.subscribe();
        let (router, mut queues) =
            ShardRouter::with_queues(1, 1, Arc::new(AtomicU64::new(0)), bus);
        let f = flow("clicks");

        assert!(router.enqueue(&f, vec![RawEvent::from("first")]));
        let offered = tokio::time::timeout(
            Duration::from_millis(100),
            async { router.enqueue(&f, vec![RawEvent::from("second"), RawEvent::from("third")]) },
        )
        .await
        .expect("enqueue must not block");
        assert!(!offered);

        let queued = queues[0].try_recv().unwrap();
        assert_eq!(queued.items, vec![RawEvent::from("first")]);
        assert!(queues[0].try_recv().is_err());

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, LifecycleKind::BatchDropped);
        assert_eq!(ev.flow.as_deref(), Some("clicks"));
        assert_eq!(ev.count, Some(2));
    }

    #[tokio::test]
    async fn closed_queue_drops() {
        let (router, queues) =
            ShardRouter::with_queues(2, 4, Arc::new(AtomicU64::new(0)), Bus::new(8));
        drop(queues);
        assert!(!router.enqueue(&flow("a"), vec![RawEvent::from("x")]));
        assert_eq!(router.shards(), 2);
    }
}
