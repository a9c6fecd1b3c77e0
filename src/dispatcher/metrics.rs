//! Delivery counters.

use crate::models::MetricsSnapshot;
use std::time::Duration;

/// Mutable counters owned by the dispatcher.
#[derive(Debug, Default)]
pub struct Metrics {
    total_events: u64,
    successful_flushes: u64,
    failed_flushes: u64,
    average_flush_ms: f64,
}

impl Metrics {
    pub fn record_event(&mut self) {
        self.total_events += 1;
    }

    /// Count a successful flush and fold its duration into the running
    /// average from the previous average and count alone.
    pub fn record_success(&mut self, duration: Duration) {
        self.successful_flushes += 1;
        let n = self.successful_flushes as f64;
        let sample = duration.as_secs_f64() * 1000.0;
        self.average_flush_ms = (self.average_flush_ms * (n - 1.0) + sample) / n;
    }

    pub fn record_failure(&mut self) {
        self.failed_flushes += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_events: self.total_events,
            successful_flushes: self.successful_flushes,
            failed_flushes: self.failed_flushes,
            average_flush_ms: self.average_flush_ms,
        }
    }
}
