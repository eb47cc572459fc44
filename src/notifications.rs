//! Live notification toasts.
//!
//! The hub pushes short messages; each one becomes a [`Notification`] at the
//! front of the active list and disappears again after the display window
//! (five seconds) unless the user dismisses it earlier. Both removal paths
//! are idempotent.
//!
//! Expiry timers hold only a weak reference to the list. Once the last
//! [`NotificationCenter`] handle is dropped, pending timers wake up, find
//! nothing, and exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::model::Notification;
use crate::push::PushChannel;

/// Hub event carrying a notification message.
pub const RECEIVE_NOTIFICATION: &str = "ReceiveNotification";

/// How long a notification stays visible.
pub const DISPLAY_WINDOW: Duration = Duration::from_millis(5000);

struct Inner {
    entries: Mutex<Vec<Notification>>,
    last_id: AtomicU64,
    display_for: Duration,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|n| n.id != id);
        entries.len() != before
    }
}

/// Owner of the active notification list.
///
/// Cloning yields another handle onto the same list.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::with_display_for(DISPLAY_WINDOW)
    }

    /// Use a different display window.
    pub fn with_display_for(display_for: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(Vec::new()),
                last_id: AtomicU64::new(0),
                display_for,
            }),
        }
    }

    /// Allocate an id from the current time, bumped past the previous id so
    /// that bursts within one millisecond stay unique and ordered.
    fn next_id(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let previous = self
            .inner
            .last_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    /// Show a new notification and schedule its expiry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add(&self, message: impl Into<String>) -> Notification {
        let notification = Notification {
            id: self.next_id(),
            message: message.into(),
            received_at: Utc::now(),
        };

        self.inner.entries().insert(0, notification.clone());
        info!(id = notification.id, "Notification received");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let id = notification.id;
        let display_for = self.inner.display_for;
        tokio::spawn(async move {
            tokio::time::sleep(display_for).await;
            if let Some(inner) = weak.upgrade() {
                if inner.remove(id) {
                    debug!(id, "Notification expired");
                }
            }
        });

        notification
    }

    /// Dismiss a notification. Returns whether it was still active.
    pub fn remove(&self, id: u64) -> bool {
        self.inner.remove(id)
    }

    /// Active notifications, most recent first.
    pub fn active(&self) -> Vec<Notification> {
        self.inner.entries().clone()
    }

    pub fn clear(&self) {
        self.inner.entries().clear();
    }

    /// Register this centre as the `ReceiveNotification` handler of `channel`.
    pub fn attach(&self, channel: PushChannel) -> PushChannel {
        let center = self.clone();
        channel.on(RECEIVE_NOTIFICATION, move |arguments: &[Value]| {
            match arguments.first().and_then(Value::as_str) {
                Some(message) => {
                    center.add(message);
                }
                None => warn!(
                    argument_count = arguments.len(),
                    "Ignoring notification without a message"
                ),
            }
        })
    }
}
