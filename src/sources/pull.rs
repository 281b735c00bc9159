//! # Pull abstraction and closure-backed pulls.
//!
//! A [`Pull`] is the source-specific half of a flow source: it knows how to
//! fetch the next batch of raw payloads from somewhere (a topic, a queue, a
//! directory). The generic half, the loop, cancellation and hand-off to the
//! engine, lives in [`FlowSource`](crate::FlowSource).
//!
//! A pull is owned by exactly one loop task, so its methods take `&mut self`.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::error::IngestError;
use crate::model::RawEvent;

/// # Source-specific batch fetch.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use flowvisor::{IngestError, Pull, RawEvent};
///
/// struct Countdown(u32);
///
/// #[async_trait]
/// impl Pull for Countdown {
///     async fn pull(&mut self) -> Result<Vec<RawEvent>, IngestError> {
///         if self.0 == 0 {
///             return Ok(Vec::new()); // idle: the loop backs off
///         }
///         self.0 -= 1;
///         Ok(vec![RawEvent::from(self.0.to_string())])
///     }
/// }
/// ```
#[async_trait]
pub trait Pull: Send + 'static {
    /// Connects to the external source. Called once by `FlowSource::start`;
    /// an error aborts the start and rolls back the flow registration.
    async fn open(&mut self) -> Result<(), IngestError> {
        Ok(())
    }

    /// Fetches the next batch. An empty batch means "nothing right now".
    ///
    /// Any error is fatal to the flow source. The future may be dropped at
    /// any await point when the source is stopped.
    async fn pull(&mut self) -> Result<Vec<RawEvent>, IngestError>;

    /// Releases resources after the loop ends on a stop request or an error.
    async fn close(&mut self) {}
}

/// Closure-backed pull.
///
/// The closure is called for each batch and returns a fresh future.
///
/// ```rust
/// use flowvisor::{IngestError, PullFn, RawEvent};
///
/// let pull = PullFn::boxed(|| async { Ok::<_, IngestError>(vec![RawEvent::from("tick")]) });
/// ```
pub struct PullFn<F> {
    f: F,
}

impl<F, Fut> PullFn<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<RawEvent>, IngestError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the pull as a boxed trait object.
    pub fn boxed(f: F) -> Box<dyn Pull> {
        Box::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Pull for PullFn<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<RawEvent>, IngestError>> + Send + 'static,
{
    async fn pull(&mut self) -> Result<Vec<RawEvent>, IngestError> {
        (self.f)().await
    }
}

impl<F> fmt::Debug for PullFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullFn").finish_non_exhaustive()
    }
}
