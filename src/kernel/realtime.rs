//! Room-keyed realtime push (§4.5, §6.2). Grounded on the teacher's
//! `StreamHub` (topic-keyed `tokio::sync::broadcast` channels), generalized
//! from server-sent events to a native `axum` WebSocket upgrade and from
//! "topic" to "room" (`user:<externalSubject>`).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// Process-wide singleton. A room is created lazily on first subscribe and
/// is never explicitly torn down (broadcast channels with zero receivers
/// simply drop sent messages).
pub struct RealtimeHub {
    rooms: RwLock<HashMap<String, broadcast::Sender<serde_json::Value>>>,
    capacity: usize,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        Self { rooms: RwLock::new(HashMap::new()), capacity }
    }

    pub fn room_for_subject(subject: &str) -> String {
        format!("user:{subject}")
    }

    fn sender(&self, room: &str) -> broadcast::Sender<serde_json::Value> {
        if let Some(tx) = self.rooms.read().unwrap().get(room) {
            return tx.clone();
        }
        let mut rooms = self.rooms.write().unwrap();
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Push a payload to every active session in `room`. Dropped silently
    /// if nobody is subscribed (matches §4.5: "drop silently" semantics for
    /// unreachable rooms extend naturally to empty ones).
    pub fn publish(&self, room: &str, payload: serde_json::Value) {
        let tx = self.sender(room);
        let _ = tx.send(payload);
    }

    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<serde_json::Value> {
        self.sender(room).subscribe()
    }

    /// Drop rooms with no active subscribers, mirroring the teacher's
    /// periodic `StreamHub::cleanup`.
    pub fn cleanup(&self) {
        self.rooms.write().unwrap().retain(|_, tx| tx.receiver_count() > 0);
    }
}

/// Shared hub handle passed into the application state.
pub type SharedRealtimeHub = Arc<RealtimeHub>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribed_room() {
        let hub = RealtimeHub::new(16);
        let room = RealtimeHub::room_for_subject("dev|user");
        let mut rx = hub.subscribe(&room);

        hub.publish(&room, serde_json::json!({"id": "x", "status": "ready"}));

        let received = rx.recv().await.unwrap();
        assert_eq!(received["status"], "ready");
    }

    #[tokio::test]
    async fn publish_to_different_room_is_not_observed() {
        let hub = RealtimeHub::new(16);
        let mut rx = hub.subscribe(&RealtimeHub::room_for_subject("dev|user-a"));

        hub.publish(&RealtimeHub::room_for_subject("dev|user-b"), serde_json::json!({"id": "x"}));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cleanup_drops_rooms_with_no_subscribers() {
        let hub = RealtimeHub::new(16);
        let room = RealtimeHub::room_for_subject("dev|user");
        {
            let _rx = hub.subscribe(&room);
        }
        hub.cleanup();
        assert!(hub.rooms.read().unwrap().is_empty());
    }
}
