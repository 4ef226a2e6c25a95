//! Broadcast hub feeding the per-user notification streams.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each open stream
//! subscribes and keeps only the events addressed to its user.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::{Notification, Notifier};

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct Delivery {
    pub user_id: i64,
    pub notification: Notification,
}

/// Cloneable; keep one in AppState.
#[derive(Clone)]
pub struct NotificationFanout {
    sender: broadcast::Sender<Arc<Delivery>>,
}

impl NotificationFanout {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Delivery>> {
        self.sender.subscribe()
    }
}

impl Default for NotificationFanout {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for NotificationFanout {
    fn notify(&self, user_id: i64, notification: Notification) {
        tracing::debug!(user_id, kind = ?notification.kind, "notification");
        // send() only fails when nobody is listening.
        let _ = self.sender.send(Arc::new(Delivery {
            user_id,
            notification,
        }));
    }
}
