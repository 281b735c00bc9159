//! # Lifecycle subscribers.
//!
//! [`Subscribe`] is the observer extension point; [`SubscriberSet`] fans
//! lifecycle events out to every subscriber through its own bounded queue.
//!
//! ```text
//! Bus ──► engine listener ──► SubscriberSet::emit ──► [queue] ──► Subscribe::on_event
//! ```

mod set;
mod subscriber;

pub use set::SubscriberSet;
pub use subscriber::Subscribe;
