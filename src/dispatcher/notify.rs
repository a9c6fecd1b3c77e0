//! In-process notifications published by the dispatcher.
//!
//! Subscribers receive every notification sent after they subscribe; a
//! subscriber that falls more than the channel capacity behind skips the
//! oldest ones.

use std::fmt;
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Something observable happened inside the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// An event was accepted into the queue.
    EventRecorded { event_type: String },
    /// A batch was delivered.
    FlushCompleted { count: usize },
    /// A batch was dropped after exhausting retries.
    FlushFailed { error: String },
    /// Metrics were exported to a file.
    MetricsSaved { path: PathBuf },
    /// The dispatcher finished shutting down.
    Shutdown,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::EventRecorded { event_type } => write!(f, "event recorded: {}", event_type),
            Notification::FlushCompleted { count } => write!(f, "flushed {} events", count),
            Notification::FlushFailed { error } => write!(f, "flush failed: {}", error),
            Notification::MetricsSaved { path } => write!(f, "metrics saved to {}", path.display()),
            Notification::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Broadcast publisher for [`Notification`]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn emit(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let notifier = Notifier::new(4);
        notifier.emit(Notification::Shutdown);
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.emit(Notification::FlushCompleted { count: 3 });
        notifier.emit(Notification::Shutdown);

        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::FlushCompleted { count: 3 }
        );
        assert_eq!(rx.recv().await.unwrap(), Notification::Shutdown);
    }

    #[test]
    fn test_display() {
        let n = Notification::FlushFailed {
            error: "HTTP 500".to_string(),
        };
        assert_eq!(n.to_string(), "flush failed: HTTP 500");
    }
}
