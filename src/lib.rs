//! # flowvisor
//!
//! **Flowvisor** is a sharded event-ingestion engine for Rust.
//!
//! A *flow* binds a name to a source of raw payloads, a [`Decoder`] that
//! turns each payload into structured [`Event`]s, and an [`EventReceiver`]
//! that stores them. The engine pulls from every registered flow
//! concurrently, spreads the batches over a fixed pool of shard workers and
//! keeps going when single items, receivers or sources fail.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ FlowSource A │   │ FlowSource B │   │ FlowSource C │
//!     │ (pull loop)  │   │ (pull loop)  │   │ (pull loop)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ non-empty batch  │                  │
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ShardRouter: global counter % N, try_send (full → BatchDropped)  │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     [queue 0]          [queue 1]   ...    [queue N-1]   (bounded)
//!        │                  │                  │
//!     worker 0           worker 1    ...    worker N-1
//!        │ decode(raw) → events → receiver.submit_event(event)
//!        ▼
//!     counter[shard] += 1  ──►  StatsReporter (every stats_interval)
//!
//! Engine, sources, router, workers ── publish ──► Bus ──► listener ──► SubscriberSet
//! ```
//!
//! ### Lifecycle
//! ```text
//! add_flow(flow)
//!   ├─► name taken?            → DuplicateFlow
//!   ├─► SourceRegistry::create → UnknownSource / factory error
//!   ├─► insert into registry
//!   └─► FlowSource::start      → open() failed: entry rolled back, error returned
//!
//! drop_flow(flow)
//!   ├─► not registered?        → FlowNotFound
//!   └─► remove entry, then FlowSource::stop (bounded, log-only)
//!
//! shutdown()                   (idempotent)
//!   ├─► stop every source
//!   ├─► cancel and join workers (bounded, then abort; queued batches discarded)
//!   ├─► flush receivers
//!   └─► final stats report
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Engine**        | Flow registry, shard pool, stats, shutdown.                  | [`Engine`], [`EngineBuilder`]               |
//! | **Flows**         | Immutable decoder + receiver binding, declarative resolution.| [`Flow`], [`FlowDefinition`]                |
//! | **Decoding**      | Raw payload → events, registration by class/content type.    | [`Decoder`], [`DecoderFn`], [`DecoderRegistry`] |
//! | **Receivers**     | Event sinks looked up by name.                               | [`EventReceiver`], [`ReceiverDirectory`]    |
//! | **Sources**       | Pull loops, registration by source kind.                     | [`Pull`], [`PullFn`], [`SourceRegistry`]    |
//! | **Subscriber API**| Hook into lifecycle events (metrics, alerting, audit).       | [`Subscribe`], [`LifecycleEvent`]           |
//! | **Errors**        | Typed errors with stable labels.                             | [`IngestError`], [`DecodeError`], [`ReceiverError`] |
//! | **Configuration** | Lenient JSON-backed properties and engine settings.          | [`ConfigProperties`], [`EngineConfig`]      |
//!
//! ## Example
//! ```rust
//! use flowvisor::{
//!     ChannelReceiver, ConfigProperties, Context, DecoderFn, Engine, Event, Flow,
//!     IngestError, PullFn, RawEvent, SourceRegistry,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), IngestError> {
//!     let ctx = Context::with_config(ConfigProperties::new().with("consumer_threads", 2));
//!
//!     let sources = SourceRegistry::new("ticker").with("ticker", |_flow| {
//!         let mut n = 0_u32;
//!         Ok(PullFn::boxed(move || {
//!             n += 1;
//!             let batch = if n <= 3 { vec![RawEvent::from(format!("tick {n}"))] } else { Vec::new() };
//!             async move { Ok::<_, IngestError>(batch) }
//!         }))
//!     });
//!
//!     let engine = Engine::builder("ingest", &ctx).with_sources(sources).build();
//!
//!     let (sink, mut rx) = ChannelReceiver::arc("sink", 16);
//!     let flow = Flow::builder("ticks", "ticker")
//!         .decoder("text", DecoderFn::arc(|raw: &RawEvent| {
//!             Ok(vec![Event::from_string(raw.as_text()?.into_owned())])
//!         }))
//!         .receiver(sink)
//!         .build()?;
//!     engine.add_flow(flow).await?;
//!
//!     let first = rx.recv().await.expect("an event");
//!     assert!(first.to_string().contains("tick"));
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
mod config;
mod context;
mod core;
mod error;
mod flows;
mod lifecycle;
mod model;
mod sources;
mod subscribers;

// ---- Public re-exports ----

pub use config::{
    BUS_CAPACITY_KEY, CONSUMER_THREADS_KEY, ConfigProperties, DEFAULT_THREADS, EngineConfig,
    IDLE_BACKOFF_KEY, POOL_SHUTDOWN_TIMEOUT_KEY, QUEUE_CAPACITY_KEY, SOURCE_STOP_TIMEOUT_KEY,
    STATS_INTERVAL_KEY, THREADS_ENV, parse_thread_override, system_threads,
};
pub use context::Context;
pub use crate::core::{Engine, EngineBuilder, ShardRouter, StatsSnapshot};
pub use error::{DecodeError, IngestError, ReceiverError};
pub use flows::{
    CONTENT_TYPE_KEY, ChannelReceiver, Decoder, DecoderFn, DecoderRef, DecoderRegistry,
    EventReceiver, Flow, FlowBuilder, FlowDefinition, ReceiverDirectory, ReceiverRef,
};
pub use lifecycle::{Bus, LifecycleEvent, LifecycleKind};
pub use model::{Event, RawEvent};
pub use sources::{FlowSource, Pull, PullFn, SOURCE_KIND_KEY, SourceParams, SourceRegistry, SourceState};
pub use subscribers::{Subscribe, SubscriberSet};
