//! # Throughput counters and the periodic stats report.
//!
//! Every shard worker owns one counter in [`ShardStats`] and bumps it once per
//! raw item it decoded and dispatched. A single stats task reads all counters
//! every `stats_interval` and logs:
//!
//! ```text
//! <engine> processed <n> events in last <secs> secs (<rate> events/sec).
//! Over all time <total> events (<rate> events/sec)
//! ```
//!
//! The task runs one last report when it is cancelled at shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::lifecycle::{Bus, LifecycleEvent, LifecycleKind};

/// Per-shard processed-item counters.
///
/// Each slot is written only by its own worker.
#[derive(Clone, Debug)]
pub(crate) struct ShardStats {
    counters: Arc<[AtomicU64]>,
}

impl ShardStats {
    pub(crate) fn new(shards: usize) -> Self {
        let counters: Vec<AtomicU64> = (0..shards).map(|_| AtomicU64::new(0)).collect();
        Self {
            counters: counters.into(),
        }
    }

    #[inline]
    pub(crate) fn incr(&self, shard: usize) {
        if let Some(c) = self.counters.get(shard) {
            c.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            per_shard: self
                .counters
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

/// Point-in-time copy of the shard counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Raw items processed per shard, index-aligned with shard numbers.
    pub per_shard: Vec<u64>,
}

impl StatsSnapshot {
    /// Raw items processed over all shards.
    pub fn total(&self) -> u64 {
        self.per_shard.iter().sum()
    }
}

/// State of the periodic report: rates are computed against the previous run.
pub(crate) struct StatsReporter {
    engine: String,
    stats: ShardStats,
    bus: Bus,
    started: Instant,
    last_at: Option<Instant>,
    last_total: u64,
}

impl StatsReporter {
    pub(crate) fn new(engine: impl Into<String>, stats: ShardStats, bus: Bus) -> Self {
        Self {
            engine: engine.into(),
            stats,
            bus,
            started: Instant::now(),
            last_at: None,
            last_total: 0,
        }
    }

    /// Logs one report and returns the total so far.
    pub(crate) fn report(&mut self) -> u64 {
        let now = Instant::now();
        let since_start = now.duration_since(self.started).as_secs_f64();
        let interval = match self.last_at {
            Some(at) => now.duration_since(at).as_secs_f64(),
            None => since_start,
        };

        let total = self.stats.snapshot().total();
        let delta = total.saturating_sub(self.last_total);
        self.last_total = total;
        self.last_at = Some(now);

        if interval > 0.0 && since_start > 0.0 {
            info!(
                engine = %self.engine,
                "{} processed {} events in last {:.1} secs ({:.2} events/sec). Over all time {} events ({:.2} events/sec)",
                self.engine,
                delta,
                interval,
                delta as f64 / interval,
                total,
                total as f64 / since_start,
            );
        }
        self.bus
            .publish(LifecycleEvent::new(LifecycleKind::StatsReported).with_count(total));
        total
    }

    /// Reports every `period` until cancelled, then reports once more.
    pub(crate) async fn run(mut self, period: Duration, token: CancellationToken) {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
        self.report();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_per_shard() {
        let stats = ShardStats::new(3);
        stats.incr(0);
        stats.incr(2);
        stats.incr(2);
        stats.incr(7);

        let snap = stats.snapshot();
        assert_eq!(snap.per_shard, vec![1, 0, 2]);
        assert_eq!(snap.total(), 3);
    }

    #[tokio::test]
    async fn report_tracks_deltas_and_publishes() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let stats = ShardStats::new(2);
        let mut reporter = StatsReporter::new("ingest", stats.clone(), bus);

        stats.incr(0);
        stats.incr(1);
        assert_eq!(reporter.report(), 2);
        stats.incr(1);
        assert_eq!(reporter.report(), 3);
        assert_eq!(reporter.last_total, 3);

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, LifecycleKind::StatsReported);
        assert_eq!(ev.count, Some(2));
    }

    #[tokio::test]
    async fn cancellation_runs_a_final_report() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let reporter = StatsReporter::new("ingest", ShardStats::new(1), bus);
        let token = CancellationToken::new();

        let handle = tokio::spawn(reporter.run(Duration::from_secs(3600), token.clone()));
        token.cancel();
        handle.await.unwrap();

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, LifecycleKind::StatsReported);
        assert_eq!(ev.count, Some(0));
    }
}
