//! Presence registry: maps a user id to its single live WebSocket connection
//! and routes targeted event pushes. Thread-safe; shared via Arc.
//!
//! A user has at most one registered connection; a later register for the same
//! user replaces the earlier one. Unregister removes an entry only when the
//! connection id matches, so a stale connection closing late cannot evict a
//! newer live one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::events::ServerEvent;
use crate::metrics::Metrics;

/// Per-connection state: the sender feeding the socket's send task.
#[derive(Debug)]
pub struct ConnectionEntry {
    pub conn_id: u64,
    tx: mpsc::Sender<String>,
}

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(0);

fn next_conn_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Registry of live WebSocket connections keyed by user id.
///
/// Mutated only by the connection lifecycle (register/unregister); read by the
/// lifecycle (snapshot) and by domain handlers dispatching pushes. Rebuilt from
/// nothing on restart: everyone is offline until they reconnect.
pub struct PresenceRegistry {
    inner: dashmap::DashMap<i32, Arc<ConnectionEntry>>,
    metrics: Arc<Metrics>,
}

impl PresenceRegistry {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            inner: dashmap::DashMap::new(),
            metrics,
        }
    }

    /// Register a connection for the given user, replacing any existing one
    /// (last connection wins). Returns the entry and the receiver for the send
    /// task. Caller must call `unregister(uid, entry.conn_id)` when the socket
    /// closes.
    pub fn register(&self, uid: i32) -> (Arc<ConnectionEntry>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(64);
        let entry = Arc::new(ConnectionEntry {
            conn_id: next_conn_id(),
            tx,
        });
        self.inner.insert(uid, entry.clone());
        self.metrics.ws_connections.set(self.inner.len() as i64);
        (entry, rx)
    }

    /// Remove the user's entry, but only if it still belongs to `conn_id`.
    /// No-op when the user is absent or a newer connection has taken over.
    pub fn unregister(&self, uid: i32, conn_id: u64) {
        self.inner.remove_if(&uid, |_, entry| entry.conn_id == conn_id);
        self.metrics.ws_connections.set(self.inner.len() as i64);
    }

    /// Current connection for a user, if online. Pure read.
    pub fn lookup(&self, uid: i32) -> Option<Arc<ConnectionEntry>> {
        self.inner.get(&uid).map(|r| r.value().clone())
    }

    /// All currently-online user ids, for the online-users broadcast.
    pub fn snapshot(&self) -> Vec<i32> {
        self.inner.iter().map(|r| *r.key()).collect()
    }

    /// Push an event to one user's live connection. Fire-and-forget: offline
    /// recipients and full/closed channels drop the event silently.
    pub fn push_to_user(&self, uid: i32, event: &ServerEvent) {
        let Some(entry) = self.lookup(uid) else {
            tracing::debug!(uid, "push skipped, recipient offline");
            return;
        };
        let frame = match serde_json::to_string(event) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(uid, "serialize realtime event: {:?}", e);
                return;
            }
        };
        if entry.tx.try_send(frame).is_ok() {
            self.metrics.pushes_delivered.inc();
        } else {
            self.metrics.pushes_dropped.inc();
            tracing::debug!(uid, conn_id = entry.conn_id, "push try_send failed");
        }
    }

    /// Send an event to every live connection (online-users snapshot only).
    pub fn broadcast_all(&self, event: &ServerEvent) {
        let frame = match serde_json::to_string(event) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("serialize realtime event: {:?}", e);
                return;
            }
        };
        for r in self.inner.iter() {
            if r.value().tx.try_send(frame.clone()).is_err() {
                tracing::debug!(uid = *r.key(), conn_id = r.value().conn_id, "broadcast try_send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MessagePayload, Notification, NotificationKind, UserDetails};
    use chrono::Utc;

    fn registry() -> PresenceRegistry {
        PresenceRegistry::new(Arc::new(Metrics::new().unwrap()))
    }

    fn message_event(id: i64, sender: i32, receiver: i32) -> ServerEvent {
        ServerEvent::NewMessage(MessagePayload {
            id,
            sender_id: sender,
            receiver_id: receiver,
            message: "hello".to_string(),
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn register_then_lookup_and_snapshot() {
        let reg = registry();
        assert!(reg.lookup(1).is_none());

        let (entry, _rx) = reg.register(1);
        assert_eq!(reg.lookup(1).unwrap().conn_id, entry.conn_id);
        assert_eq!(reg.snapshot(), vec![1]);

        reg.unregister(1, entry.conn_id);
        assert!(reg.lookup(1).is_none());
        assert!(reg.snapshot().is_empty());
    }

    #[tokio::test]
    async fn later_register_replaces_earlier_one() {
        let reg = registry();
        let (first, _rx1) = reg.register(1);
        let (second, _rx2) = reg.register(1);
        assert_ne!(first.conn_id, second.conn_id);
        assert_eq!(reg.lookup(1).unwrap().conn_id, second.conn_id);
        assert_eq!(reg.snapshot(), vec![1]);
    }

    #[tokio::test]
    async fn stale_unregister_keeps_live_connection() {
        // Two handshakes for the same user, then the first socket closes.
        let reg = registry();
        let (first, _rx1) = reg.register(1);
        let (second, _rx2) = reg.register(1);

        reg.unregister(1, first.conn_id);
        assert_eq!(reg.lookup(1).unwrap().conn_id, second.conn_id);

        reg.unregister(1, second.conn_id);
        assert!(reg.lookup(1).is_none());
    }

    #[tokio::test]
    async fn push_to_offline_user_is_a_noop() {
        let reg = registry();
        reg.push_to_user(42, &message_event(1, 2, 42));
        assert!(reg.snapshot().is_empty());
    }

    #[tokio::test]
    async fn push_delivers_frame_to_recipient() {
        let reg = registry();
        let (_entry, mut rx) = reg.register(2);

        reg.push_to_user(2, &message_event(7, 1, 2));

        let frame = rx.recv().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["type"], "newMessage");
        assert_eq!(v["payload"]["receiverId"], 2);
    }

    #[tokio::test]
    async fn push_targets_only_the_recipient() {
        let reg = registry();
        let (_a, mut rx_a) = reg.register(1);
        let (_b, mut rx_b) = reg.register(2);

        let event = ServerEvent::Notification(Notification {
            kind: NotificationKind::Like,
            user_id: 1,
            user_details: UserDetails {
                username: "ada".to_string(),
                profile_picture: None,
            },
            post_id: Some(5),
        });
        reg.push_to_user(2, &event);

        let frame = rx_b.recv().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["payload"]["type"], "like");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let reg = registry();
        let (_a, mut rx_a) = reg.register(1);
        let (_b, mut rx_b) = reg.register(2);

        let mut online = reg.snapshot();
        online.sort_unstable();
        assert_eq!(online, vec![1, 2]);

        reg.broadcast_all(&ServerEvent::OnlineUsers(online));
        for rx in [&mut rx_a, &mut rx_b] {
            let v: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(v["type"], "getOnlineUsers");
            assert_eq!(v["payload"], serde_json::json!([1, 2]));
        }
    }
}
