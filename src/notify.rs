use dashmap::DashMap;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// What a notice is about. Rendering into user-facing text (and the locale
/// lookup) happens in the conversational front end, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    BookingConfirmed,
    BookingCancelled,
    ReminderStudent,
    ReminderTeacher,
    LessonDelayed,
    LessonCancelled,
}

/// One outbound notification intent: a key plus JSON parameters for the
/// translation layer to interpolate.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub key: MessageKey,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed,
}

/// Outbound notification hub. The front end subscribes per recipient; the
/// engine delivers fire-and-forget and treats the result as at-most-once —
/// a failed delivery is logged by the caller, never retried.
pub struct NotifyHub {
    channels: DashMap<i64, broadcast::Sender<Notice>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notices for a recipient. Creates the channel if needed.
    pub fn subscribe(&self, recipient_id: i64) -> broadcast::Receiver<Notice> {
        let sender = self
            .channels
            .entry(recipient_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Deliver a notice. Fails when the recipient has no live subscriber.
    pub fn deliver(&self, recipient_id: i64, key: MessageKey, params: serde_json::Value) -> Delivery {
        let Some(sender) = self.channels.get(&recipient_id) else {
            return Delivery::Failed;
        };
        match sender.send(Notice { key, params }) {
            Ok(_) => Delivery::Delivered,
            Err(_) => Delivery::Failed,
        }
    }

    /// Remove a channel (e.g. when a user blocks the bot).
    #[allow(dead_code)]
    pub fn remove(&self, recipient_id: &i64) {
        self.channels.remove(recipient_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(42);

        let result = hub.deliver(42, MessageKey::BookingConfirmed, json!({"branch": "main"}));
        assert_eq!(result, Delivery::Delivered);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.key, MessageKey::BookingConfirmed);
        assert_eq!(received.params["branch"], "main");
    }

    #[tokio::test]
    async fn deliver_without_subscriber_fails() {
        let hub = NotifyHub::new();
        let result = hub.deliver(42, MessageKey::ReminderStudent, json!({}));
        assert_eq!(result, Delivery::Failed);
    }

    #[tokio::test]
    async fn deliver_after_receiver_dropped_fails() {
        let hub = NotifyHub::new();
        let rx = hub.subscribe(42);
        drop(rx);
        let result = hub.deliver(42, MessageKey::LessonDelayed, json!({}));
        assert_eq!(result, Delivery::Failed);
    }
}
