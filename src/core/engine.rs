//! # Engine: flow registry, shard pool, stats and shutdown.
//!
//! The [`Engine`] owns everything that runs: one [`FlowSource`] per
//! registered flow, one worker per shard, the stats task and the lifecycle
//! listener that feeds the [`SubscriberSet`].
//!
//! ## Architecture
//! ```text
//! add_flow(flow) ──► SourceRegistry::create ──► FlowSource::start
//!                                                   │ pull loop
//!                                                   ▼
//!                         ShardRouter::enqueue (round robin, drop on full)
//!                     ┌──────────────┬──────────────┬──────────────┐
//!                     ▼              ▼              ▼
//!                 [queue 0]      [queue 1]  ... [queue N-1]
//!                     │              │              │
//!                 worker 0       worker 1   ... worker N-1
//!                     └── decode ──► receiver.submit_event ──► counter[shard]++
//!
//! Engine, sources, workers ── publish ──► Bus ──► listener ──► SubscriberSet
//! ```
//!
//! ## Shutdown path
//! ```text
//! shutdown()
//!   ├─► publish ShutdownRequested
//!   ├─► stop every FlowSource          (bounded wait each)
//!   ├─► cancel workers, wait           (bounded, then abort → PoolStopTimeout)
//!   ├─► flush each distinct receiver   (best effort)
//!   ├─► cancel stats task              (runs a last report)
//!   └─► publish ShutdownComplete       (listener drains subscribers and exits)
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::context::Context;
use crate::core::builder::EngineBuilder;
use crate::core::registry::FlowRegistry;
use crate::core::router::ShardRouter;
use crate::core::shutdown;
use crate::core::stats::{ShardStats, StatsSnapshot};
use crate::error::IngestError;
use crate::flows::Flow;
use crate::lifecycle::{Bus, LifecycleEvent, LifecycleKind};
use crate::sources::{FlowSource, SourceParams, SourceRegistry};
use crate::subscribers::SubscriberSet;

/// Background tasks owned by a running engine.
pub(crate) struct EngineTasks {
    pub(crate) workers: JoinSet<()>,
    pub(crate) stats: JoinHandle<()>,
    pub(crate) listener: JoinHandle<()>,
}

/// Ingestion engine.
///
/// Built with [`Engine::builder`]; shared as `Arc<Engine>`.
pub struct Engine {
    name: String,
    cfg: EngineConfig,
    bus: Bus,
    router: ShardRouter,
    sources: SourceRegistry,
    flows: FlowRegistry,
    stats: ShardStats,
    shut_down: AtomicBool,
    pool_token: CancellationToken,
    stats_token: CancellationToken,
    tasks: Mutex<Option<EngineTasks>>,
}

impl Engine {
    /// Starts building an engine named `name`, configured from `ctx`.
    pub fn builder(name: impl Into<String>, ctx: &Context) -> EngineBuilder {
        EngineBuilder::new(name, ctx)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        name: String,
        cfg: EngineConfig,
        bus: Bus,
        router: ShardRouter,
        sources: SourceRegistry,
        stats: ShardStats,
        pool_token: CancellationToken,
        stats_token: CancellationToken,
        tasks: EngineTasks,
    ) -> Self {
        Self {
            name,
            cfg,
            bus,
            router,
            sources,
            flows: FlowRegistry::new(),
            stats,
            shut_down: AtomicBool::new(false),
            pool_token,
            stats_token,
            tasks: Mutex::new(Some(tasks)),
        }
    }

    /// Engine name (used in logs and stats reports).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Number of shards (and workers).
    pub fn shards(&self) -> usize {
        self.router.shards()
    }

    /// Subscribes directly to the lifecycle bus.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.bus.subscribe()
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn source_params(&self) -> SourceParams {
        SourceParams {
            idle_backoff: self.cfg.idle_backoff,
            stop_timeout: self.cfg.source_stop_timeout,
        }
    }

    fn reject(&self, flow: &str, err: &IngestError) {
        warn!(flow = %flow, error = %err, label = err.as_label(), "flow rejected");
        self.bus.publish(
            LifecycleEvent::new(LifecycleKind::FlowRejected)
                .with_flow(flow)
                .with_reason(err.to_string()),
        );
    }

    /// Registers a flow and starts pulling from its source.
    ///
    /// ### Errors
    /// - [`IngestError::ShutDown`] after [`shutdown`](Self::shutdown).
    /// - [`IngestError::DuplicateFlow`] if the name is taken; the existing flow is untouched.
    /// - [`IngestError::UnknownSource`] or a factory error if no pull can be built.
    /// - Any [`Pull::open`](crate::Pull::open) error; the registration is rolled back.
    ///
    /// A flow dropped while its source was starting is stopped again; the
    /// call still returns `Ok` but no `FlowAdded` is published.
    pub async fn add_flow(&self, flow: impl Into<Arc<Flow>>) -> Result<(), IngestError> {
        let flow: Arc<Flow> = flow.into();
        if self.is_shut_down() {
            return Err(IngestError::ShutDown {
                engine: self.name.clone(),
            });
        }

        let registered = self
            .flows
            .insert_with(flow.name(), || {
                let pull = self.sources.create(&flow)?;
                Ok(Arc::new(FlowSource::new(
                    Arc::clone(&flow),
                    pull,
                    self.router.clone(),
                    self.bus.clone(),
                    self.source_params(),
                )))
            })
            .await;
        let source = match registered {
            Ok(source) => source,
            Err(e) => {
                self.reject(flow.name(), &e);
                return Err(e);
            }
        };

        if let Err(e) = source.start().await {
            self.flows.remove_same(&source).await;
            self.reject(flow.name(), &e);
            return Err(e);
        }

        if self.is_shut_down() {
            source.stop().await;
            self.flows.remove_same(&source).await;
            return Err(IngestError::ShutDown {
                engine: self.name.clone(),
            });
        }
        if !self.flows.contains_same(&source).await {
            // dropped while it was starting
            source.stop().await;
            debug!(flow = %flow.name(), "flow dropped during start");
            return Ok(());
        }

        info!(flow = %flow.name(), definition = %flow.definition(), "flow added");
        self.bus
            .publish(LifecycleEvent::new(LifecycleKind::FlowAdded).with_flow(flow.name()));
        Ok(())
    }

    /// Unregisters `flow` and stops its source.
    ///
    /// Stop problems are logged, never returned.
    ///
    /// ### Errors
    /// - [`IngestError::FlowNotFound`] if no flow with that name is registered.
    pub async fn drop_flow(&self, flow: &Flow) -> Result<(), IngestError> {
        self.drop_flow_named(flow.name()).await
    }

    /// Same as [`drop_flow`](Self::drop_flow), by name.
    pub async fn drop_flow_named(&self, name: &str) -> Result<(), IngestError> {
        let Some(source) = self.flows.remove(name).await else {
            return Err(IngestError::FlowNotFound {
                name: name.to_string(),
            });
        };
        info!(flow = %name, "dropping flow");
        self.bus
            .publish(LifecycleEvent::new(LifecycleKind::FlowRemoved).with_flow(name));
        source.stop().await;
        Ok(())
    }

    /// Number of registered flows.
    pub async fn flow_count(&self) -> usize {
        self.flows.len().await
    }

    /// Registered flow names, sorted.
    pub async fn flow_names(&self) -> Vec<String> {
        self.flows.names().await
    }

    /// Snapshot of the per-shard processed-item counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops sources, workers and stats reporting.
    ///
    /// Idempotent: only the first call does anything. Always completes;
    /// timeouts are logged and published, not returned.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(engine = %self.name, "shutting down");
        self.bus
            .publish(LifecycleEvent::new(LifecycleKind::ShutdownRequested));

        let sources = self.flows.snapshot().await;
        for source in &sources {
            source.stop().await;
        }

        let tasks = self.tasks.lock().await.take();
        self.pool_token.cancel();
        let Some(EngineTasks {
            mut workers,
            stats,
            listener,
        }) = tasks
        else {
            return;
        };

        let drained = time::timeout(self.cfg.pool_shutdown_timeout, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            workers.abort_all();
            warn!(
                engine = %self.name,
                timeout = ?self.cfg.pool_shutdown_timeout,
                "shard workers did not stop in time, aborted"
            );
            self.bus
                .publish(LifecycleEvent::new(LifecycleKind::PoolStopTimeout));
        }

        flush_receivers(&sources).await;

        self.stats_token.cancel();
        if let Err(e) = stats.await {
            warn!(engine = %self.name, error = %e, "stats task ended abnormally");
        }

        info!(engine = %self.name, "shutdown complete");
        self.bus
            .publish(LifecycleEvent::new(LifecycleKind::ShutdownComplete));
        if time::timeout(self.cfg.pool_shutdown_timeout, listener)
            .await
            .is_err()
        {
            warn!(engine = %self.name, "lifecycle listener did not drain in time");
        }
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then shuts down.
    ///
    /// If no signal listener can be installed the engine is shut down at once.
    pub async fn run_until_signal(&self) {
        match shutdown::wait_for_signal().await {
            Ok(signal) => info!(engine = %self.name, signal, "termination signal received"),
            Err(e) => warn!(engine = %self.name, error = %e, "cannot listen for signals"),
        }
        self.shutdown().await;
    }
}

/// Registered sources cancel their own loops when the registry drops them.
impl Drop for Engine {
    fn drop(&mut self) {
        self.pool_token.cancel();
        self.stats_token.cancel();
    }
}

/// Subscribes to the bus now and forwards every event to `set`.
///
/// Exits after forwarding `ShutdownComplete` (or when the bus closes), then
/// drains the subscriber queues.
pub(crate) fn spawn_listener(bus: &Bus, set: SubscriberSet) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let last = ev.kind == LifecycleKind::ShutdownComplete;
                    set.emit(Arc::new(ev));
                    if last {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "lifecycle listener lagged, events lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        set.shutdown().await;
    })
}

/// Flushes every distinct receiver bound to `sources`, once each.
async fn flush_receivers(sources: &[Arc<FlowSource>]) {
    let mut seen = HashSet::new();
    for source in sources {
        let flow = source.flow();
        if !seen.insert(flow.receiver_name().to_string()) {
            continue;
        }
        if let Err(e) = flow.receiver().flush().await {
            warn!(receiver = %flow.receiver_name(), error = %e, "receiver flush failed");
        }
    }
}
