//! Error types for the dispatcher and delivery sinks.
//!
//! | Error                       | Raised by                  | Retried |
//! |-----------------------------|----------------------------|---------|
//! | `DispatchError::Validation` | `record`, `save_metrics`   | no      |
//! | `DispatchError::Closed`     | `record` after shutdown    | no      |
//! | `DeliveryError::*`          | sink delivery              | yes     |
//! | `DispatchError::Io`         | metrics export             | no      |

use std::path::PathBuf;
use thiserror::Error;

/// A failed attempt to hand a batch to the sink.
///
/// Every variant is retryable; the dispatcher does not distinguish a
/// non-2xx response from a transport failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("sink returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by the dispatcher's public operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("dispatcher is shut down")]
    Closed,

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize metrics: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DispatchError {
    /// Returns the underlying delivery error, if this is one.
    pub fn as_delivery(&self) -> Option<&DeliveryError> {
        match self {
            DispatchError::Delivery(e) => Some(e),
            _ => None,
        }
    }
}
