//! Notification sink collaborator.
//!
//! The engine only ever asks for "show the user a transient error"; how that
//! is rendered (toast, status line, stderr) belongs to the caller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default time a notification stays on screen.
pub const DEFAULT_TTL: Duration = Duration::from_secs(4);

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// How long the message should stay visible.
    #[serde(with = "ttl_millis")]
    pub ttl: Duration,
}

impl Notification {
    /// Create an error notification with the default TTL.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
            created_at: Utc::now(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Create an informational notification with the default TTL.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            ..Self::error(message)
        }
    }

    /// Whether the notification should no longer be displayed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !chrono::Duration::from_std(self.ttl).is_ok_and(|ttl| now < self.created_at + ttl)
    }
}

mod ttl_millis {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)] // serde's `with` passes by reference
    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Receives user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Logs notifications and records them as Sentry breadcrumbs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => {
                tracing::warn!(message = %notification.message, "User notified of error");
            }
            NotificationLevel::Info => {
                tracing::info!(message = %notification.message, "User notified");
            }
        }

        sentry::add_breadcrumb(sentry::Breadcrumb {
            category: Some("cart.notification".to_string()),
            message: Some(notification.message),
            level: match notification.level {
                NotificationLevel::Error => sentry::Level::Error,
                NotificationLevel::Info => sentry::Level::Info,
            },
            ..Default::default()
        });
    }
}

/// Fans notifications out to any number of UI subscribers.
///
/// Notifications sent while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    /// Create a notifier buffering up to `capacity` undelivered messages per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification dropped, no subscribers");
        }
    }
}

/// Keeps every notification in memory (tests, CLI summaries).
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    inner: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages recorded so far.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .map(|n| n.message)
            .collect()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notification::error("Out of stock"));
        notifier.notify(Notification::info("Saved"));

        assert_eq!(notifier.messages(), vec!["Out of stock", "Saved"]);
        assert_eq!(notifier.drain().len(), 2);
        assert!(notifier.notifications().is_empty());
    }

    #[test]
    fn test_notification_expiry() {
        let n = Notification::error("boom");
        assert!(!n.is_expired_at(n.created_at));
        assert!(n.is_expired_at(n.created_at + chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_notification_serializes_ttl_as_millis() {
        let json = serde_json::to_value(Notification::error("boom")).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["message"], "boom");
        assert_eq!(json["ttl"], 4000);
    }

    #[tokio::test]
    async fn test_broadcast_notifier_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.notify(Notification::error("Failed to update cart"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "Failed to update cart");
        assert_eq!(received.level, NotificationLevel::Error);
    }
}
