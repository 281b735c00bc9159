//! # Shard worker: drains one shard queue.
//!
//! ```text
//! loop {
//!   select! { cancelled → exit, queue.recv() → (flow, batch) }
//!   for raw in batch {
//!     decode(raw) ── Err/panic → warn + DecodeFailed, skip this item only
//!       └─ Ok(events) → for event: receiver.submit_event(event)
//!                         └─ Err/panic → warn + ReceiverFailed, keep going
//!     counter[shard] += 1
//!   }
//! }
//! ```
//!
//! A bad item or a failing receiver never costs more than that one item or
//! event; the worker itself only ends on cancellation or a closed queue.
//! Every [`PROGRESS_INTERVAL`] decoded items a worker logs its running total
//! at debug level.

use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::router::Batch;
use crate::core::stats::ShardStats;
use crate::error::{DecodeError, ReceiverError, panic_message};
use crate::flows::{Decoder, Flow};
use crate::lifecycle::{Bus, LifecycleEvent, LifecycleKind};
use crate::model::{Event, RawEvent};

/// Decoded items between two progress lines of one worker.
pub(crate) const PROGRESS_INTERVAL: u64 = 100_000;

pub(crate) struct ShardWorker {
    shard: usize,
    rx: mpsc::Receiver<Batch>,
    stats: ShardStats,
    bus: Bus,
    processed: u64,
    progress_every: u64,
}

impl ShardWorker {
    pub(crate) fn new(shard: usize, rx: mpsc::Receiver<Batch>, stats: ShardStats, bus: Bus) -> Self {
        Self {
            shard,
            rx,
            stats,
            bus,
            processed: 0,
            progress_every: PROGRESS_INTERVAL,
        }
    }

    /// Takes batches until cancelled. Batches still queued at that point are discarded.
    pub(crate) async fn run(mut self, token: CancellationToken) {
        loop {
            let batch = select! {
                biased;
                _ = token.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(batch) => batch,
                    None => break,
                },
            };
            self.process(batch).await;
        }
        debug!(shard = self.shard, processed = self.processed, "shard worker exited");
    }

    async fn process(&mut self, batch: Batch) {
        let Batch { flow, items } = batch;
        for raw in &items {
            let events = match decode(flow.decoder().as_ref(), raw) {
                Ok(events) => events,
                Err(e) => {
                    warn!(
                        flow = %flow.name(),
                        shard = self.shard,
                        kind = raw.kind(),
                        error = %e,
                        "failed to decode raw event, skipped"
                    );
                    self.bus.publish(
                        LifecycleEvent::new(LifecycleKind::DecodeFailed)
                            .with_flow(flow.name())
                            .with_shard(self.shard)
                            .with_reason(e.to_string()),
                    );
                    continue;
                }
            };

            for event in events {
                if let Err(e) = submit(&flow, event).await {
                    warn!(
                        flow = %flow.name(),
                        receiver = %flow.receiver_name(),
                        shard = self.shard,
                        error = %e,
                        "receiver rejected event"
                    );
                    self.bus.publish(
                        LifecycleEvent::new(LifecycleKind::ReceiverFailed)
                            .with_flow(flow.name())
                            .with_shard(self.shard)
                            .with_reason(e.to_string()),
                    );
                }
            }
            self.stats.incr(self.shard);
            self.record_processed();
        }
    }

    /// Counts one decoded item; returns true when a progress line was logged.
    fn record_processed(&mut self) -> bool {
        self.processed += 1;
        if self.processed % self.progress_every != 0 {
            return false;
        }
        debug!(shard = self.shard, processed = self.processed, "shard worker progress");
        true
    }
}

fn decode(decoder: &dyn Decoder, raw: &RawEvent) -> Result<Vec<Event>, DecodeError> {
    panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(raw)))
        .unwrap_or_else(|payload| Err(DecodeError::Panicked(panic_message(payload.as_ref()))))
}

async fn submit(flow: &Flow, event: Event) -> Result<(), ReceiverError> {
    AssertUnwindSafe(flow.receiver().submit_event(event))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(ReceiverError::Panicked(panic_message(payload.as_ref()))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{DecoderFn, DecoderRef, EventReceiver};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records events; rejects the first `fail_first` submissions.
    struct Recording {
        seen: Mutex<Vec<Event>>,
        fail_first: Mutex<usize>,
    }

    impl Recording {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail_first: Mutex::new(fail_first),
            })
        }

        fn texts(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string())
                .collect()
        }
    }

    #[async_trait]
    impl EventReceiver for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn submit_event(&self, event: Event) -> Result<(), ReceiverError> {
            {
                let mut left = self.fail_first.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(ReceiverError::Parse("rejected".into()));
                }
            }
            self.seen.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn text_decoder() -> DecoderRef {
        DecoderFn::arc(|raw: &RawEvent| {
            let text = raw.as_text()?;
            match &*text {
                "bad" => Err(DecodeError::Invalid("bad item".into())),
                "boom" => panic!("decoder blew up"),
                other => Ok(vec![Event::from_iter([("text", other)])]),
            }
        })
    }

    fn flow(receiver: Arc<Recording>) -> Arc<Flow> {
        Arc::new(
            Flow::builder("clicks", "test")
                .decoder("text", text_decoder())
                .receiver(receiver)
                .build()
                .unwrap(),
        )
    }

    async fn run_one(flow: Arc<Flow>, items: Vec<RawEvent>) -> (ShardStats, Bus) {
        let bus = Bus::new(64);
        let stats = ShardStats::new(1);
        let (tx, rx) = mpsc::channel(4);
        let worker = ShardWorker::new(0, rx, stats.clone(), bus.clone());
        tx.send(Batch { flow, items }).await.unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), worker.run(CancellationToken::new()))
            .await
            .unwrap();
        (stats, bus)
    }

    #[tokio::test]
    async fn decode_failure_skips_only_that_item() {
        let recv = Recording::new(0);
        let items = vec![
            RawEvent::from("one"),
            RawEvent::from("bad"),
            RawEvent::from("three"),
        ];
        let (stats, _bus) = run_one(flow(recv.clone()), items).await;

        assert_eq!(recv.texts(), vec!["one", "three"]);
        assert_eq!(stats.snapshot().total(), 2);
    }

    #[tokio::test]
    async fn decoder_panic_is_contained() {
        let recv = Recording::new(0);
        let items = vec![RawEvent::from("boom"), RawEvent::from("after")];
        let (stats, _bus) = run_one(flow(recv.clone()), items).await;

        assert_eq!(recv.texts(), vec!["after"]);
        assert_eq!(stats.snapshot().total(), 1);
    }

    #[tokio::test]
    async fn receiver_failure_does_not_abort_batch() {
        let recv = Recording::new(1);
        let items = vec![RawEvent::from("first"), RawEvent::from("second")];
        let (stats, _bus) = run_one(flow(recv.clone()), items).await;

        assert_eq!(recv.texts(), vec!["second"]);
        // both items decoded and dispatched
        assert_eq!(stats.snapshot().total(), 2);
    }

    #[tokio::test]
    async fn progress_is_counted_per_decoded_item() {
        let recv = Recording::new(0);
        let (_tx, rx) = mpsc::channel::<Batch>(1);
        let mut worker = ShardWorker::new(0, rx, ShardStats::new(1), Bus::new(4));
        worker.progress_every = 2;

        let items = vec![
            RawEvent::from("one"),
            RawEvent::from("bad"),
            RawEvent::from("three"),
            RawEvent::from("four"),
        ];
        worker.process(Batch { flow: flow(recv), items }).await;
        assert_eq!(worker.processed, 3);

        // 4th decoded item hits the interval, 5th does not
        assert!(worker.record_processed());
        assert!(!worker.record_processed());
        assert_eq!(PROGRESS_INTERVAL, 100_000);
    }

    #[tokio::test]
    async fn cancelled_worker_exits_while_idle() {
        let (_tx, rx) = mpsc::channel::<Batch>(1);
        let worker = ShardWorker::new(0, rx, ShardStats::new(1), Bus::new(4));
        let token = CancellationToken::new();
        let handle = tokio::spawn(worker.run(token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
