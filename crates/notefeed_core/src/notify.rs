//! User-facing notification surface.
//!
//! # Responsibility
//! - Carry human-readable outcome messages from components to the shell.
//! - Model the transient toast stack (auto-close, oldest first).
//!
//! # Invariants
//! - Notifications never carry structured error codes; only a level and text.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default toast lifetime.
pub const DEFAULT_AUTO_CLOSE: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

impl NotificationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Sink for transient user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that keeps every notification, for tests and headless runs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    entries: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all notifications received so far, oldest first.
    pub fn entries(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Returns the most recent notification.
    pub fn last(&self) -> Option<Notification> {
        self.entries().pop()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(notification);
        }
    }
}

#[derive(Debug, Clone)]
struct Toast {
    notification: Notification,
    shown_at: Instant,
}

/// Stack of visible toasts with auto-close.
#[derive(Debug, Clone)]
pub struct ToastQueue {
    auto_close: Duration,
    toasts: VecDeque<Toast>,
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_CLOSE)
    }
}

impl ToastQueue {
    pub fn new(auto_close: Duration) -> Self {
        Self {
            auto_close,
            toasts: VecDeque::new(),
        }
    }

    /// Shows `notification` as of `now`.
    pub fn push(&mut self, notification: Notification, now: Instant) {
        self.prune(now);
        self.toasts.push_back(Toast {
            notification,
            shown_at: now,
        });
    }

    /// Returns toasts still visible at `now`, oldest first.
    pub fn visible(&mut self, now: Instant) -> Vec<Notification> {
        self.prune(now);
        self.toasts
            .iter()
            .map(|toast| toast.notification.clone())
            .collect()
    }

    /// Dismisses every toast.
    pub fn dismiss_all(&mut self) {
        self.toasts.clear();
    }

    fn prune(&mut self, now: Instant) {
        let auto_close = self.auto_close;
        self.toasts
            .retain(|toast| now.saturating_duration_since(toast.shown_at) < auto_close);
    }
}
