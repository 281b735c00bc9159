//! Engine core: scheduling, shards and lifecycle.
//!
//! The public entry points are [`Engine`] (built with [`EngineBuilder`]) and
//! the [`ShardRouter`] every flow source enqueues through.
//!
//! Internal modules:
//! - [`router`]: round-robin, drop-on-full dispatch onto shard queues;
//! - [`worker`]: per-shard decode and delivery loop;
//! - [`stats`]: per-shard counters and the periodic throughput report;
//! - [`registry`]: name → flow source map guarded by one lock;
//! - [`engine`]: add/drop flows and the shutdown sequence;
//! - [`shutdown`]: termination signal handling.

mod builder;
mod engine;
mod registry;
mod router;
mod shutdown;
mod stats;
mod worker;

pub use builder::EngineBuilder;
pub use engine::Engine;
pub use router::ShardRouter;
pub use stats::StatsSnapshot;

#[cfg(test)]
pub(crate) use router::Batch;
