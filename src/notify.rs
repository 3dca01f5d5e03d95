use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient user-facing message (a toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(buffer: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(NotificationLevel::Info, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(NotificationLevel::Success, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(NotificationLevel::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(NotificationLevel::Error, message.into());
    }

    fn push(&self, level: NotificationLevel, message: String) {
        match level {
            NotificationLevel::Warning | NotificationLevel::Error => {
                warn!(?level, %message, "notification")
            }
            _ => info!(?level, %message, "notification"),
        }

        // Nobody listening is fine; toasts are fire-and-forget.
        let _ = self.tx.send(Notification { level, message });
    }
}

#[cfg(test)]
mod tests {
    use super::{NotificationLevel, Notifier};

    #[tokio::test]
    async fn subscribers_receive_messages_in_order() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.success("Order 7 accepted for pickup!");
        notifier.error("Failed to fetch routes.");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.level, NotificationLevel::Success);
        assert_eq!(first.message, "Order 7 accepted for pickup!");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.level, NotificationLevel::Error);
    }

    #[test]
    fn sending_without_subscribers_does_not_panic() {
        let notifier = Notifier::new(0);
        notifier.info("Logged out successfully.");
    }
}
