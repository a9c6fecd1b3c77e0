//! HTTP delivery sink.
//!
//! Posts each batch as a single `{"events": [...]}` JSON document. Any
//! non-2xx status counts as a failed delivery.

use crate::error::DeliveryError;
use crate::models::{BatchPayload, Event};
use crate::sink::EventSink;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;
use tracing::debug;

/// Sink that POSTs batches to a remote endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    endpoint: String,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl HttpSink {
    /// Create a sink for `endpoint` with a per-request timeout.
    pub fn new(endpoint: impl Into<String>, timeout_seconds: u64) -> Result<Self, DeliveryError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| DeliveryError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            timeout_seconds,
            http_client,
        })
    }

    async fn post_batch(&self, batch: &[Event]) -> Result<(), DeliveryError> {
        debug!("POST {} ({} events)", self.endpoint, batch.len());

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&BatchPayload { events: batch })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    DeliveryError::Transport(format!("cannot connect to {}", self.endpoint))
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }

        Ok(())
    }
}

impl EventSink for HttpSink {
    fn deliver<'a>(&'a self, batch: &'a [Event]) -> BoxFuture<'a, Result<(), DeliveryError>> {
        self.post_batch(batch).boxed()
    }
}
