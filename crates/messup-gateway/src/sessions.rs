use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use messup_types::events::GatewayEvent;

/// Push side of one live connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl SessionHandle {
    /// Create a handle and the receiver its connection drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                conn_id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue an event for the connection. Returns false if the connection
    /// has already gone away. Never blocks.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Identity -> current live connection. One handle per identity; the last
/// bind wins.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `handle`, returning the handle it replaced.
    pub async fn bind(&self, user_id: Uuid, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions.write().await.insert(user_id, handle)
    }

    /// Remove the binding, but only if `conn_id` still owns it. A connection
    /// that was superseded by a newer one must not unbind its successor.
    pub async fn unbind(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&user_id) {
            Some(handle) if handle.conn_id == conn_id => {
                sessions.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Current connection for `user_id`. `None` means not connected.
    pub async fn lookup(&self, user_id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&user_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_bind_wins() {
        let registry = SessionRegistry::new();
        let user = Uuid::new_v4();
        let (first, _rx1) = SessionHandle::channel();
        let (second, _rx2) = SessionHandle::channel();

        assert!(registry.bind(user, first.clone()).await.is_none());
        let replaced = registry.bind(user, second.clone()).await.unwrap();
        assert_eq!(replaced.conn_id(), first.conn_id());
        assert_eq!(registry.lookup(user).await.unwrap().conn_id(), second.conn_id());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn stale_unbind_is_ignored() {
        let registry = SessionRegistry::new();
        let user = Uuid::new_v4();
        let (first, _rx1) = SessionHandle::channel();
        let (second, _rx2) = SessionHandle::channel();

        registry.bind(user, first.clone()).await;
        registry.bind(user, second.clone()).await;

        assert!(!registry.unbind(user, first.conn_id()).await);
        assert!(registry.lookup(user).await.is_some());
        assert!(registry.unbind(user, second.conn_id()).await);
        assert!(registry.lookup(user).await.is_none());
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_reports_failure() {
        let (handle, rx) = SessionHandle::channel();
        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.send(GatewayEvent::Error {
            kind: "test".into(),
            message: "gone".into(),
        }));
    }
}
