//! Flow sources: pulling raw batches and handing them to the shards.
//!
//! - [`pull`]: the [`Pull`] seam and the closure-backed [`PullFn`];
//! - [`source`]: [`FlowSource`], the per-flow pull loop and its state machine;
//! - [`registry`]: [`SourceRegistry`], pull factories keyed by source kind.

mod pull;
mod registry;
mod source;

pub use pull::{Pull, PullFn};
pub use registry::{SOURCE_KIND_KEY, SourceRegistry};
pub use source::{FlowSource, SourceParams, SourceState};
