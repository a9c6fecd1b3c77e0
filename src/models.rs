//! Data models for the event dispatcher.
//!
//! This module contains the core data structures shared by the dispatcher,
//! the delivery sinks, the input reader and the metrics export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arbitrary key/value properties attached to an event.
pub type Properties = Map<String, Value>;

/// A single event record awaiting delivery.
///
/// Events are immutable once created; the timestamp is assigned at
/// construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type (e.g. `"page_view"`, `"signup"`).
    pub event_type: String,
    /// Identifier of the subject the event is about (user, device, ...).
    pub subject_id: String,
    /// Free-form event properties.
    #[serde(default)]
    pub properties: Properties,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates a new event stamped with the current time.
    pub fn new(
        event_type: impl Into<String>,
        subject_id: impl Into<String>,
        properties: Properties,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            subject_id: subject_id.into(),
            properties,
            timestamp: Utc::now(),
        }
    }
}

/// The JSON document sent to the delivery sink for one batch.
#[derive(Debug, Serialize)]
pub struct BatchPayload<'a> {
    pub events: &'a [Event],
}

/// Point-in-time copy of the dispatcher's delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Number of events accepted by `record`.
    pub total_events: u64,
    /// Number of batches delivered successfully.
    pub successful_flushes: u64,
    /// Number of batches dropped after exhausting retries.
    pub failed_flushes: u64,
    /// Running average duration of successful flushes, in milliseconds.
    pub average_flush_ms: f64,
}

/// Metrics export written to disk on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    /// Events still pending at export time.
    pub queue_length: usize,
    /// When the export was taken (ISO-8601).
    pub saved_at: DateTime<Utc>,
}

impl MetricsReport {
    /// Captures a report for the given snapshot and queue length.
    pub fn new(metrics: MetricsSnapshot, queue_length: usize) -> Self {
        Self {
            metrics,
            queue_length,
            saved_at: Utc::now(),
        }
    }
}

/// One line of CLI input.
///
/// Accepts the short field names producers commonly use (`type`,
/// `subject`, `user_id`) as aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct InputRecord {
    #[serde(alias = "type")]
    pub event_type: String,
    #[serde(alias = "subject", alias = "user_id")]
    pub subject_id: String,
    #[serde(default)]
    pub properties: Properties,
}
