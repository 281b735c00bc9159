//! # FlowSource: one pull loop per registered flow.
//!
//! A [`FlowSource`] owns the [`Pull`] of one flow and drives it from a
//! dedicated task, handing every non-empty batch to the engine's
//! [`ShardRouter`].
//!
//! ## State machine
//! ```text
//!            start() ok               stop()
//! Created ─────────────► Running ─────────────► Stopped
//!    │  ▲                    │
//!    │  └── open() failed    └── pull error: loop ends, SourceFailed
//!    └── stop(): no-op            (state stays Running until stop())
//! ```
//!
//! ## Pull loop
//! ```text
//! loop {
//!   select! { cancelled → break, pull() → batch }
//!   ├─ Ok(non-empty) → router.enqueue(flow, batch)
//!   ├─ Ok(empty)     → select! { cancelled → break, sleep(idle_backoff) }
//!   └─ Err(e)        → break with IngestError::Source
//! }
//! pull.close()
//! ```
//!
//! ## Rules
//! - Exactly one loop task per started source.
//! - `stop()` waits at most `stop_timeout`, then aborts the task.
//! - Stop on a never-started or already stopped source does nothing.
//! - Dropping the last handle cancels the loop without waiting for it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::ShardRouter;
use crate::error::IngestError;
use crate::flows::Flow;
use crate::lifecycle::{Bus, LifecycleEvent, LifecycleKind};
use crate::sources::Pull;

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Observable state of a [`FlowSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Built, loop not spawned yet.
    Created,
    /// Loop spawned (it may have ended on its own after a pull error).
    Running,
    /// Stopped on request; cannot be restarted.
    Stopped,
}

impl SourceState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            CREATED => SourceState::Created,
            RUNNING => SourceState::Running,
            _ => SourceState::Stopped,
        }
    }
}

/// Timing parameters of a source.
///
/// Extracted from [`EngineConfig`](crate::EngineConfig) by the engine.
#[derive(Clone, Copy, Debug)]
pub struct SourceParams {
    /// Sleep after an empty batch.
    pub idle_backoff: Duration,
    /// Bounded wait in [`FlowSource::stop`] before the loop is aborted.
    pub stop_timeout: Duration,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

struct Slots {
    pull: Option<Box<dyn Pull>>,
    join: Option<JoinHandle<Result<(), IngestError>>>,
}

/// Drives the pull loop of one flow.
pub struct FlowSource {
    flow: Arc<Flow>,
    router: ShardRouter,
    bus: Bus,
    params: SourceParams,
    state: AtomicU8,
    token: CancellationToken,
    slots: Mutex<Slots>,
}

impl FlowSource {
    /// Creates a source in the `Created` state; nothing runs until [`start`](Self::start).
    pub fn new(
        flow: Arc<Flow>,
        pull: Box<dyn Pull>,
        router: ShardRouter,
        bus: Bus,
        params: SourceParams,
    ) -> Self {
        Self {
            flow,
            router,
            bus,
            params,
            state: AtomicU8::new(CREATED),
            token: CancellationToken::new(),
            slots: Mutex::new(Slots {
                pull: Some(pull),
                join: None,
            }),
        }
    }

    /// The flow this source feeds.
    pub fn flow(&self) -> &Arc<Flow> {
        &self.flow
    }

    /// Current state.
    pub fn state(&self) -> SourceState {
        SourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Opens the pull and spawns the loop task.
    ///
    /// ### Errors
    /// - [`IngestError::AlreadyStarted`] unless the source is `Created`.
    /// - Whatever [`Pull::open`] returns; the source then stays `Created`.
    pub async fn start(&self) -> Result<(), IngestError> {
        let mut slots = self.slots.lock().await;
        if self.state.load(Ordering::Acquire) != CREATED {
            return Err(IngestError::AlreadyStarted {
                flow: self.flow.name().to_string(),
            });
        }
        let Some(mut pull) = slots.pull.take() else {
            return Err(IngestError::AlreadyStarted {
                flow: self.flow.name().to_string(),
            });
        };

        if let Err(e) = pull.open().await {
            slots.pull = Some(pull);
            return Err(e);
        }

        self.state.store(RUNNING, Ordering::Release);
        let handle = tokio::spawn(pull_loop(
            Arc::clone(&self.flow),
            pull,
            self.router.clone(),
            self.bus.clone(),
            self.params.idle_backoff,
            self.token.clone(),
        ));
        slots.join = Some(handle);

        info!(flow = %self.flow.name(), "flow source started");
        self.bus
            .publish(LifecycleEvent::new(LifecycleKind::SourceStarted).with_flow(self.flow.name()));
        Ok(())
    }

    /// Cancels the loop and waits for it, bounded by the stop timeout.
    ///
    /// Never fails: a loop that outlives the timeout is aborted and a warning
    /// is logged. No-op unless the source is `Running`.
    pub async fn stop(&self) {
        let mut slots = self.slots.lock().await;
        if self
            .state
            .compare_exchange(RUNNING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.token.cancel();

        let Some(mut join) = slots.join.take() else {
            return;
        };
        match time::timeout(self.params.stop_timeout, &mut join).await {
            Ok(Ok(_)) => {
                info!(flow = %self.flow.name(), "flow source stopped");
                self.bus.publish(
                    LifecycleEvent::new(LifecycleKind::SourceStopped).with_flow(self.flow.name()),
                );
            }
            Ok(Err(join_err)) => {
                warn!(flow = %self.flow.name(), error = %join_err, "flow source task ended abnormally");
                self.bus.publish(
                    LifecycleEvent::new(LifecycleKind::SourceStopped)
                        .with_flow(self.flow.name())
                        .with_reason(join_err.to_string()),
                );
            }
            Err(_elapsed) => {
                join.abort();
                warn!(
                    flow = %self.flow.name(),
                    timeout = ?self.params.stop_timeout,
                    "flow source did not stop in time, aborted"
                );
                self.bus.publish(
                    LifecycleEvent::new(LifecycleKind::SourceStopTimeout)
                        .with_flow(self.flow.name()),
                );
            }
        }
    }
}

impl Drop for FlowSource {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl fmt::Display for FlowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flow.name())
    }
}

impl fmt::Debug for FlowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowSource")
            .field("flow", &self.flow.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn pull_loop(
    flow: Arc<Flow>,
    mut pull: Box<dyn Pull>,
    router: ShardRouter,
    bus: Bus,
    idle_backoff: Duration,
    token: CancellationToken,
) -> Result<(), IngestError> {
    let outcome = loop {
        let next = select! {
            biased;
            _ = token.cancelled() => break Ok(()),
            res = pull.pull() => res,
        };

        match next {
            Ok(batch) if batch.is_empty() => {
                select! {
                    _ = token.cancelled() => break Ok(()),
                    _ = time::sleep(idle_backoff) => {}
                }
            }
            Ok(batch) => {
                router.enqueue(&flow, batch);
                // a pull that is always ready must not starve the runtime
                tokio::task::yield_now().await;
            }
            Err(e) => break Err(e),
        }
    };

    pull.close().await;

    match outcome {
        Ok(()) => {
            debug!(flow = %flow.name(), "pull loop cancelled");
            Ok(())
        }
        Err(e) => {
            let err = match e {
                IngestError::Source { .. } => e,
                other => IngestError::source_failed(flow.name(), other),
            };
            error!(flow = %flow.name(), error = %err, "flow source failed, pull loop terminated");
            bus.publish(
                LifecycleEvent::new(LifecycleKind::SourceFailed)
                    .with_flow(flow.name())
                    .with_reason(err.to_string()),
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{ChannelReceiver, DecoderFn};
    use crate::model::{Event, RawEvent};
    use crate::sources::PullFn;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, AtomicUsize};

    fn flow(name: &str) -> Arc<Flow> {
        let (recv, _rx) = ChannelReceiver::arc("sink", 1);
        let flow = Flow::builder(name, "test")
            .decoder("text", DecoderFn::arc(|_raw: &RawEvent| Ok(Vec::<Event>::new())))
            .receiver(recv)
            .build()
            .unwrap();
        Arc::new(flow)
    }

    fn router(bus: &Bus) -> (ShardRouter, Vec<tokio::sync::mpsc::Receiver<crate::core::Batch>>) {
        ShardRouter::with_queues(1, 64, Arc::new(AtomicU64::new(0)), bus.clone())
    }

    fn fast() -> SourceParams {
        SourceParams {
            idle_backoff: Duration::from_millis(5),
            stop_timeout: Duration::from_secs(1),
        }
    }

    struct Tracked {
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
        fail_open: bool,
    }

    #[async_trait]
    impl Pull for Tracked {
        async fn open(&mut self) -> Result<(), IngestError> {
            if self.fail_open {
                return Err(IngestError::source_failed("tracked", "connection refused"));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn pull(&mut self) -> Result<Vec<RawEvent>, IngestError> {
            Ok(Vec::new())
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let bus = Bus::new(16);
        let mut events = bus.subscribe();
        let (router, _queues) = router(&bus);
        let pull = PullFn::boxed(|| async { Ok::<_, IngestError>(vec![RawEvent::from("x")]) });
        let source = FlowSource::new(flow("idle"), pull, router, bus.clone(), fast());

        source.stop().await;
        source.stop().await;
        assert_eq!(source.state(), SourceState::Created);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn runs_until_stopped_and_closes_pull() {
        let bus = Bus::new(64);
        let (router, mut queues) = router(&bus);
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let pull = Box::new(Tracked {
            opened: opened.clone(),
            closed: closed.clone(),
            fail_open: false,
        });
        let source = FlowSource::new(flow("ticks"), pull, router, bus.clone(), fast());

        source.start().await.unwrap();
        assert_eq!(source.state(), SourceState::Running);
        assert!(matches!(
            source.start().await,
            Err(IngestError::AlreadyStarted { .. })
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        source.stop().await;
        assert_eq!(source.state(), SourceState::Stopped);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        // empty batches never reach the shards
        assert!(queues[0].try_recv().is_err());

        source.stop().await;
        assert!(source.start().await.is_err());
    }

    #[tokio::test]
    async fn failed_open_keeps_created_state() {
        let bus = Bus::new(16);
        let (router, _queues) = router(&bus);
        let pull = Box::new(Tracked {
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            fail_open: true,
        });
        let source = FlowSource::new(flow("broken"), pull, router, bus, fast());

        let err = source.start().await.unwrap_err();
        assert_eq!(err.as_label(), "ingest_source_failed");
        assert_eq!(source.state(), SourceState::Created);
    }

    #[tokio::test]
    async fn dropping_a_running_source_ends_its_loop() {
        let bus = Bus::new(16);
        let (router, _queues) = router(&bus);
        let closed = Arc::new(AtomicUsize::new(0));
        let pull = Box::new(Tracked {
            opened: Arc::new(AtomicUsize::new(0)),
            closed: closed.clone(),
            fail_open: false,
        });
        let source = FlowSource::new(flow("orphan"), pull, router, bus, fast());
        source.start().await.unwrap();

        drop(source);
        time::timeout(Duration::from_secs(1), async {
            while closed.load(Ordering::SeqCst) == 0 {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pull closed after drop");
    }

    /// Pull whose `close` outlives any reasonable stop timeout.
    struct SlowClose;

    #[async_trait]
    impl Pull for SlowClose {
        async fn pull(&mut self) -> Result<Vec<RawEvent>, IngestError> {
            Ok(Vec::new())
        }

        async fn close(&mut self) {
            time::sleep(Duration::from_secs(30)).await;
        }
    }

    #[tokio::test]
    async fn stop_is_bounded_and_aborts_a_stuck_loop() {
        let bus = Bus::new(16);
        let mut events = bus.subscribe();
        let (router, _queues) = router(&bus);
        let params = SourceParams {
            idle_backoff: Duration::from_millis(5),
            stop_timeout: Duration::from_millis(50),
        };
        let source = FlowSource::new(flow("stuck"), Box::new(SlowClose), router, bus.clone(), params);
        source.start().await.unwrap();

        let started = time::Instant::now();
        source.stop().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(source.state(), SourceState::Stopped);

        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&LifecycleKind::SourceStopTimeout));
        assert!(!kinds.contains(&LifecycleKind::SourceStopped));
    }

    #[tokio::test]
    async fn batches_are_routed_and_errors_end_the_loop() {
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let (router, mut queues) = router(&bus);
        let mut calls = 0_u32;
        let pull = PullFn::boxed(move || {
            calls += 1;
            let n = calls;
            async move {
                if n <= 2 {
                    Ok(vec![RawEvent::from(format!("batch-{n}"))])
                } else {
                    Err(IngestError::Source {
                        flow: "feed".into(),
                        error: "broker went away".into(),
                    })
                }
            }
        });
        let source = FlowSource::new(flow("feed"), pull, router, bus.clone(), fast());
        source.start().await.unwrap();

        let first = queues[0].recv().await.unwrap();
        let second = queues[0].recv().await.unwrap();
        assert_eq!(first.items, vec![RawEvent::from("batch-1")]);
        assert_eq!(second.items, vec![RawEvent::from("batch-2")]);

        loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == LifecycleKind::SourceFailed {
                assert_eq!(ev.flow.as_deref(), Some("feed"));
                assert!(ev.reason.as_deref().unwrap().contains("broker went away"));
                break;
            }
        }
        source.stop().await;
        assert_eq!(source.to_string(), "feed");
    }
}
