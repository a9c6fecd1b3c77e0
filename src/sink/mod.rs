//! Delivery sinks.
//!
//! A sink receives one batch at a time from the dispatcher. The production
//! sink POSTs to an HTTP endpoint; tests inject recording sinks through the
//! same trait.

pub mod http;

pub use http::HttpSink;

use crate::error::DeliveryError;
use crate::models::Event;
use futures::future::BoxFuture;

/// Destination for delivered batches.
pub trait EventSink: Send + Sync {
    /// Deliver a single batch. Any error is treated as retryable.
    fn deliver<'a>(&'a self, batch: &'a [Event]) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

#[cfg(test)]
pub mod testing {
    //! In-memory sinks for dispatcher tests.

    use super::*;
    use futures::FutureExt;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Records every delivered batch; can be told to fail, panic, stall or take time.
    #[derive(Default)]
    pub struct RecordingSink {
        batches: Mutex<Vec<Vec<Event>>>,
        attempts: AtomicUsize,
        /// Number of upcoming attempts that fail.
        failures_left: AtomicUsize,
        /// Per-attempt artificial latency, consumed in order.
        delays: Mutex<VecDeque<Duration>>,
        /// Blocks the first delivery until notified.
        gate: Option<Arc<Notify>>,
        gate_used: AtomicBool,
        /// Number of upcoming attempts that panic.
        panics_left: AtomicUsize,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn always_failing() -> Self {
            Self::failing_times(usize::MAX)
        }

        pub fn failing_times(n: usize) -> Self {
            let sink = Self::default();
            sink.failures_left.store(n, Ordering::SeqCst);
            sink
        }

        pub fn panicking_once() -> Self {
            let sink = Self::default();
            sink.panics_left.store(1, Ordering::SeqCst);
            sink
        }

        pub fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        pub fn with_delays(delays: impl IntoIterator<Item = Duration>) -> Self {
            Self {
                delays: Mutex::new(delays.into_iter().collect()),
                ..Self::default()
            }
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn batches(&self) -> Vec<Vec<Event>> {
            self.batches.lock().unwrap().clone()
        }

        /// Delivered batches reduced to their event types.
        pub fn delivered_types(&self) -> Vec<Vec<String>> {
            self.batches()
                .iter()
                .map(|b| b.iter().map(|e| e.event_type.clone()).collect())
                .collect()
        }
    }

    impl EventSink for RecordingSink {
        fn deliver<'a>(
            &'a self,
            batch: &'a [Event],
        ) -> BoxFuture<'a, Result<(), DeliveryError>> {
            async move {
                self.attempts.fetch_add(1, Ordering::SeqCst);

                let panicking = self
                    .panics_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if panicking {
                    panic!("sink exploded");
                }

                if let Some(gate) = &self.gate {
                    if !self.gate_used.swap(true, Ordering::SeqCst) {
                        gate.notified().await;
                    }
                }

                let delay = self.delays.lock().unwrap().pop_front();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }

                let failing = self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        if n == 0 {
                            None
                        } else if n == usize::MAX {
                            Some(n)
                        } else {
                            Some(n - 1)
                        }
                    })
                    .is_ok();
                if failing {
                    return Err(DeliveryError::Status {
                        status: 500,
                        body: "boom".to_string(),
                    });
                }

                self.batches.lock().unwrap().push(batch.to_vec());
                Ok(())
            }
            .boxed()
        }
    }
}
