//! The batching dispatcher.
//!
//! Events are appended to an in-memory queue and delivered to an
//! [`EventSink`] in batches of at most `batch_size`, either when the queue
//! fills up, when the periodic timer fires, or when `flush` is called.
//!
//! At most one flush runs at a time. A flush that finds another one in
//! flight returns `0` immediately instead of waiting. A batch that still
//! fails after the last retry is dropped, not re-queued.

use crate::dispatcher::metrics::Metrics;
use crate::dispatcher::notify::{Notification, Notifier};
use crate::dispatcher::retry::RetryPolicy;
use crate::error::DispatchError;
use crate::models::{Event, MetricsReport, MetricsSnapshot, Properties};
use crate::sink::{EventSink, HttpSink};
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Configuration for a dispatcher. Fixed for the dispatcher's lifetime.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink endpoint URL (used by [`Dispatcher::connect`]).
    pub endpoint: String,
    /// Maximum events per batch; reaching it triggers a flush.
    pub batch_size: usize,
    /// Period of the background flush timer.
    pub flush_interval: Duration,
    /// Delivery attempts per batch, including the first.
    pub retry_attempts: u32,
    /// Backoff unit: attempt `k` failing waits `2^k * backoff_base`.
    pub backoff_base: Duration,
    /// Per-request timeout for the HTTP sink.
    pub request_timeout_seconds: u64,
    /// Buffer size of the notification channel.
    pub notification_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/events".to_string(),
            batch_size: 10,
            flush_interval: Duration::from_secs(5),
            retry_attempts: 3,
            backoff_base: Duration::from_secs(1),
            request_timeout_seconds: 30,
            notification_capacity: 256,
        }
    }
}

impl From<&crate::config::DispatcherSettings> for DispatcherConfig {
    fn from(settings: &crate::config::DispatcherSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            batch_size: settings.batch_size,
            flush_interval: Duration::from_millis(settings.flush_interval_ms),
            retry_attempts: settings.retry_attempts,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            request_timeout_seconds: settings.request_timeout_seconds,
            notification_capacity: settings.notification_capacity,
        }
    }
}

impl DispatcherConfig {
    /// Check the configuration before a dispatcher is built from it.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(DispatchError::Validation(
                "endpoint must start with 'http://' or 'https://'".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(DispatchError::Validation(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(DispatchError::Validation(
                "flush interval must be greater than zero".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(DispatchError::Validation(
                "retry attempts must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(DispatchError::Validation(
                "request timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handle to a running dispatcher. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    config: DispatcherConfig,
    retry: RetryPolicy,
    sink: Arc<dyn EventSink>,
    queue: Mutex<VecDeque<Event>>,
    metrics: Mutex<Metrics>,
    /// Set while a flush owns the head of the queue.
    flushing: AtomicBool,
    /// Set once shutdown begins; `record` is rejected afterwards.
    closed: AtomicBool,
    /// Signalled whenever a flush finishes.
    idle: Notify,
    notifier: Notifier,
    timer: Mutex<Option<Timer>>,
}

struct Timer {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Releases the in-progress flag when a flush ends, however it ends.
struct FlushGuard<'a> {
    inner: &'a Inner,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.inner.flushing.store(false, Ordering::Release);
        self.inner.idle.notify_waiters();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Dispatcher {
    /// Build a dispatcher delivering to the configured HTTP endpoint.
    ///
    /// Must be called from within a tokio runtime (the flush timer is
    /// spawned immediately).
    pub fn connect(config: DispatcherConfig) -> Result<Self, DispatchError> {
        config.validate()?;
        let sink = HttpSink::new(config.endpoint.clone(), config.request_timeout_seconds)?;
        Self::with_sink(config, Arc::new(sink))
    }

    /// Build a dispatcher delivering to an arbitrary sink.
    pub fn with_sink(
        config: DispatcherConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, DispatchError> {
        config.validate()?;

        info!(
            "Starting dispatcher: batch size {}, flush every {:?}, {} attempts",
            config.batch_size, config.flush_interval, config.retry_attempts
        );

        let inner = Arc::new(Inner {
            retry: RetryPolicy::new(config.retry_attempts, config.backoff_base),
            notifier: Notifier::new(config.notification_capacity),
            config,
            sink,
            queue: Mutex::new(VecDeque::new()),
            metrics: Mutex::new(Metrics::default()),
            flushing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            idle: Notify::new(),
            timer: Mutex::new(None),
        });

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_timer(
            Arc::downgrade(&inner),
            inner.config.flush_interval,
            stop_rx,
        ));
        *lock(&inner.timer) = Some(Timer { stop, handle });

        Ok(Self { inner })
    }

    /// Queue an event. Flushes (and waits for the flush) when the queue
    /// reaches the batch size; that flush's error is returned.
    pub async fn record(
        &self,
        event_type: impl Into<String>,
        subject_id: impl Into<String>,
        properties: Properties,
    ) -> Result<(), DispatchError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Closed);
        }

        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(DispatchError::Validation(
                "event type must not be empty".to_string(),
            ));
        }

        let event = Event::new(event_type, subject_id, properties);
        debug!("Recorded {} for {}", event.event_type, event.subject_id);
        let notification = Notification::EventRecorded {
            event_type: event.event_type.clone(),
        };

        let pending = {
            let mut queue = lock(&self.inner.queue);
            // Shutdown flips `closed` under this lock, so nothing lands after the drain.
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(DispatchError::Closed);
            }
            queue.push_back(event);
            queue.len()
        };
        lock(&self.inner.metrics).record_event();
        self.inner.notifier.emit(notification);

        if pending >= self.inner.config.batch_size {
            self.inner.flush().await?;
        }

        Ok(())
    }

    /// Deliver up to one batch. Returns the number of events delivered, or
    /// `0` if the queue is empty or another flush is in flight.
    pub async fn flush(&self) -> Result<usize, DispatchError> {
        self.inner.flush().await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        lock(&self.inner.metrics).snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue_len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifier.subscribe()
    }

    /// Export current metrics and queue length to `path` as JSON.
    pub fn save_metrics(&self, path: impl AsRef<Path>) -> Result<MetricsReport, DispatchError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(DispatchError::Validation(
                "metrics path must not be empty".to_string(),
            ));
        }

        let report = MetricsReport::new(self.metrics(), self.queue_len());
        crate::report::write_metrics_report(&report, path)?;

        info!("Metrics saved to {}", path.display());
        self.inner.notifier.emit(Notification::MetricsSaved {
            path: path.to_path_buf(),
        });

        Ok(report)
    }

    /// Stop the timer and drain the queue.
    ///
    /// Draining stops at the first failed flush and returns its error; the
    /// failed batch is lost like any other. Calling this again is a no-op.
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        let already_closed = {
            let _queue = lock(&self.inner.queue);
            self.inner.closed.swap(true, Ordering::AcqRel)
        };
        if already_closed {
            debug!("Dispatcher already shut down");
            return Ok(());
        }

        info!("Shutting down dispatcher ({} events pending)", self.queue_len());
        self.inner.stop_timer().await;

        let result = self.inner.drain().await;
        if let Err(ref e) = result {
            error!("Shutdown drain stopped: {}", e);
        }

        self.inner.notifier.emit(Notification::Shutdown);
        result
    }
}

impl Inner {
    fn queue_len(&self) -> usize {
        lock(&self.queue).len()
    }

    async fn flush(&self) -> Result<usize, DispatchError> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Flush already in progress");
            return Ok(0);
        }
        let _guard = FlushGuard { inner: self };

        let batch: Vec<Event> = {
            let mut queue = lock(&self.queue);
            let n = queue.len().min(self.config.batch_size);
            queue.drain(..n).collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        let started = Instant::now();
        let sink: &dyn EventSink = self.sink.as_ref();
        let events: &[Event] = &batch;

        match self.retry.run(move || sink.deliver(events)).await {
            Ok(()) => {
                let elapsed = started.elapsed();
                lock(&self.metrics).record_success(elapsed);
                info!("Flushed {} events in {:?}", count, elapsed);
                self.notifier.emit(Notification::FlushCompleted { count });
                Ok(count)
            }
            Err(e) => {
                lock(&self.metrics).record_failure();
                // At-most-once: the batch is not put back.
                error!(
                    "Dropping batch of {} events after {} attempts: {}",
                    count, self.retry.attempts, e
                );
                self.notifier.emit(Notification::FlushFailed {
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    async fn stop_timer(&self) {
        let timer = lock(&self.timer).take();
        if let Some(timer) = timer {
            let _ = timer.stop.send(true);
            if let Err(e) = timer.handle.await {
                warn!("Flush timer ended abnormally: {}", e);
            }
        }
    }

    /// Account for a flush that panicked. Its batch is gone like any
    /// other failed batch.
    fn flush_panicked(&self, message: String) {
        lock(&self.metrics).record_failure();
        warn!("Periodic flush panicked: {}", message);
        self.notifier.emit(Notification::FlushFailed {
            error: format!("flush panicked: {}", message),
        });
    }

    /// Flush until the queue is empty. Assumes no new events arrive.
    async fn drain(&self) -> Result<(), DispatchError> {
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.queue_len() == 0 {
                return Ok(());
            }

            let flushed = self.flush().await?;
            if flushed == 0 && self.flushing.load(Ordering::Acquire) {
                debug!("Waiting for in-flight flush before draining");
                idle.await;
            }
        }
    }
}

async fn run_timer(inner: Weak<Inner>, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.queue_len() == 0 {
            continue;
        }

        debug!("Periodic flush ({} pending)", inner.queue_len());
        match AssertUnwindSafe(inner.flush()).catch_unwind().await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Periodic flush failed: {}", e),
            Err(panic) => inner.flush_panicked(panic_message(panic.as_ref())),
        }
    }

    debug!("Flush timer stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
