//! Event batching and delivery.
//!
//! [`Dispatcher`] buffers events and hands them to a sink in bounded
//! batches, with retry/backoff, delivery metrics and notifications.

pub mod batcher;
pub mod metrics;
pub mod notify;
pub mod retry;

pub use batcher::{Dispatcher, DispatcherConfig};
pub use notify::Notification;
