//! Lifecycle events: types and broadcast bus.
//!
//! ## Contents
//! - [`LifecycleKind`], [`LifecycleEvent`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Engine`, `FlowSource` pull loops, the stats reporter,
//!   `ShardRouter` (drops), shard workers, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the engine listener (fans out to `SubscriberSet`) and anyone
//!   holding [`Engine::subscribe`](crate::Engine::subscribe).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{LifecycleEvent, LifecycleKind};
