//! # Lifecycle subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging custom observers
//! (metrics, alerting, audit) into an engine.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are reported as `LifecycleKind::SubscriberPanicked`)
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use flowvisor::{LifecycleEvent, LifecycleKind, Subscribe};
//!
//! #[derive(Default)]
//! struct DropCounter(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for DropCounter {
//!     async fn on_event(&self, ev: &LifecycleEvent) {
//!         if ev.kind == LifecycleKind::BatchDropped {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "drop-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::lifecycle::LifecycleEvent;

/// Lifecycle subscriber.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this subscriber's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event (FIFO per subscriber).
    async fn on_event(&self, event: &LifecycleEvent);

    /// Name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
