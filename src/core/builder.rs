use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    config::EngineConfig,
    context::Context,
    lifecycle::Bus,
    sources::SourceRegistry,
    subscribers::{Subscribe, SubscriberSet},
};
use super::{
    engine::{Engine, EngineTasks, spawn_listener},
    router::ShardRouter,
    stats::{ShardStats, StatsReporter},
    worker::ShardWorker,
};

/// Kind used when no [`SourceRegistry`] is supplied.
const DEFAULT_SOURCE_KIND: &str = "default";

/// Builder for an [`Engine`].
pub struct EngineBuilder {
    name: String,
    cfg: EngineConfig,
    sources: SourceRegistry,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl EngineBuilder {
    /// Creates a builder whose settings are read from the context configuration.
    pub fn new(name: impl Into<String>, ctx: &Context) -> Self {
        Self {
            name: name.into(),
            cfg: EngineConfig::from_properties(ctx.config()),
            sources: SourceRegistry::new(DEFAULT_SOURCE_KIND),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the settings read from the context.
    pub fn with_config(mut self, cfg: EngineConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the source kinds flows may use.
    ///
    /// Without it every `add_flow` fails with `UnknownSource`.
    pub fn with_sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = sources;
        self
    }

    /// Sets lifecycle subscribers.
    ///
    /// Subscribers receive engine events (flow changes, drops, failures, stats)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the engine and spawns its background tasks.
    ///
    /// Must be called inside a tokio runtime. Spawns:
    /// - one worker per shard, each draining its bounded queue
    /// - the stats reporter
    /// - the lifecycle listener feeding the subscribers
    pub fn build(self) -> Arc<Engine> {
        let cfg = self.cfg;
        let bus = Bus::new(cfg.bus_capacity);
        let listener = spawn_listener(&bus, SubscriberSet::new(self.subscribers, bus.clone()));

        let shards = cfg.shards();
        let (router, queues) = ShardRouter::with_queues(
            shards,
            cfg.queue_capacity_clamped(),
            Arc::new(AtomicU64::new(0)),
            bus.clone(),
        );
        let stats = ShardStats::new(shards);

        let pool_token = CancellationToken::new();
        let mut workers = JoinSet::new();
        for (shard, rx) in queues.into_iter().enumerate() {
            let worker = ShardWorker::new(shard, rx, stats.clone(), bus.clone());
            workers.spawn(worker.run(pool_token.clone()));
        }

        let stats_token = CancellationToken::new();
        let reporter = StatsReporter::new(self.name.clone(), stats.clone(), bus.clone());
        let stats_task = tokio::spawn(reporter.run(cfg.stats_interval, stats_token.clone()));

        tracing::info!(
            engine = %self.name,
            shards,
            queue_capacity = cfg.queue_capacity_clamped(),
            sources = ?self.sources.kinds(),
            "engine started"
        );

        Arc::new(Engine::new_internal(
            self.name,
            cfg,
            bus,
            router,
            self.sources,
            stats,
            pool_token,
            stats_token,
            EngineTasks {
                workers,
                stats: stats_task,
                listener,
            },
        ))
    }
}
