//! Transaction outcome notifications
//!
//! Fire-and-forget: the gateway logs and swallows any error returned here.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TxNotification {
    Confirmed { hash: String, kind: String },
    Failed { reason: String },
}

pub trait Notifier: Send + Sync {
    fn notify_success(&self, hash: &str, kind: &str) -> Result<(), String>;

    fn notify_failure(&self, reason: &str) -> Result<(), String>;
}

/// Writes outcomes to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_success(&self, hash: &str, kind: &str) -> Result<(), String> {
        log::info!("[notify] {} confirmed: {}", kind, hash);
        Ok(())
    }

    fn notify_failure(&self, reason: &str) -> Result<(), String> {
        log::info!("[notify] Transaction failed: {}", reason);
        Ok(())
    }
}

/// Fans notifications out to subscribers (e.g. the UI layer)
pub struct ChannelNotifier {
    subscribers: DashMap<String, mpsc::Sender<TxNotification>>,
    capacity: usize,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe and return (subscriber_id, receiver)
    pub fn subscribe(&self) -> (String, mpsc::Receiver<TxNotification>) {
        let subscriber_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.insert(subscriber_id.clone(), tx);
        log::debug!("[notify] Subscriber {} added", subscriber_id);
        (subscriber_id, rx)
    }

    pub fn unsubscribe(&self, subscriber_id: &str) {
        if self.subscribers.remove(subscriber_id).is_some() {
            log::debug!("[notify] Subscriber {} removed", subscriber_id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver to every subscriber. Full or closed subscribers are dropped;
    /// fails only when there were subscribers and none received it.
    fn broadcast(&self, notification: TxNotification) -> Result<(), String> {
        let mut failed = Vec::new();
        let mut delivered = 0usize;

        for entry in self.subscribers.iter() {
            if entry.value().try_send(notification.clone()).is_err() {
                failed.push(entry.key().clone());
            } else {
                delivered += 1;
            }
        }

        for subscriber_id in &failed {
            self.subscribers.remove(subscriber_id);
            log::debug!("[notify] Removed unresponsive subscriber {}", subscriber_id);
        }

        if delivered == 0 && !failed.is_empty() {
            return Err(format!("No subscriber accepted {:?}", notification));
        }
        Ok(())
    }
}

impl Default for ChannelNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ChannelNotifier {
    fn notify_success(&self, hash: &str, kind: &str) -> Result<(), String> {
        self.broadcast(TxNotification::Confirmed {
            hash: hash.to_string(),
            kind: kind.to_string(),
        })
    }

    fn notify_failure(&self, reason: &str) -> Result<(), String> {
        self.broadcast(TxNotification::Failed {
            reason: reason.to_string(),
        })
    }
}
