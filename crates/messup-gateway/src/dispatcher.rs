use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use messup_types::events::GatewayEvent;

use crate::sessions::{SessionHandle, SessionRegistry};
use crate::topics::TopicRegistry;

/// Owns the live push paths: point-to-point delivery through the session
/// registry and group broadcast through the topic registry.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    sessions: SessionRegistry,
    topics: TopicRegistry,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for `user_id`, replacing any previous one.
    /// The replaced connection loses its topic subscriptions along with its
    /// binding. Returns the handle and the receiver the connection should
    /// drain.
    pub async fn connect(&self, user_id: Uuid) -> (SessionHandle, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (handle, rx) = SessionHandle::channel();
        if let Some(previous) = self.inner.sessions.bind(user_id, handle.clone()).await {
            self.inner.topics.unsubscribe_all(previous.conn_id()).await;
            debug!(
                "Connection {} for {} superseded by {}",
                previous.conn_id(),
                user_id,
                handle.conn_id()
            );
        }
        debug!("{} users online", self.online_count().await);
        (handle, rx)
    }

    /// Tear down a connection: drop its topic subscriptions and its session
    /// binding if it still owns it.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: Uuid) {
        self.inner.topics.unsubscribe_all(conn_id).await;
        if self.inner.sessions.unbind(user_id, conn_id).await {
            debug!("{} users online", self.online_count().await);
        }
    }

    /// Number of users with a bound connection.
    pub async fn online_count(&self) -> usize {
        self.inner.sessions.len().await
    }

    /// Whether `user_id` currently has a live connection.
    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner
            .sessions
            .lookup(user_id)
            .await
            .is_some_and(|handle| !handle.is_closed())
    }

    /// Send a targeted event to a specific user. Returns true if a live
    /// connection accepted it; false means nobody was there to receive it.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        match self.inner.sessions.lookup(user_id).await {
            Some(handle) => handle.send(event),
            None => false,
        }
    }

    pub async fn subscribe(&self, group_id: Uuid, handle: &SessionHandle) {
        self.inner.topics.subscribe(group_id, handle).await;
    }

    pub async fn unsubscribe(&self, group_id: Uuid, conn_id: Uuid) {
        self.inner.topics.unsubscribe(group_id, conn_id).await;
    }

    /// Broadcast to every connection subscribed to a group. Returns the
    /// number of connections reached.
    pub async fn publish(&self, group_id: Uuid, event: GatewayEvent) -> usize {
        self.inner.topics.publish(group_id, &event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(message: &str) -> GatewayEvent {
        GatewayEvent::Error {
            kind: "test".into(),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn targeted_send_follows_latest_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        assert!(!dispatcher.send_to_user(user, event("nobody")).await);

        let (old, mut old_rx) = dispatcher.connect(user).await;
        let (_new, mut new_rx) = dispatcher.connect(user).await;
        assert!(dispatcher.send_to_user(user, event("hello")).await);
        assert!(old_rx.try_recv().is_err());
        assert_eq!(new_rx.try_recv().unwrap(), event("hello"));

        // The superseded connection closing must not unbind the new one
        dispatcher.disconnect(user, old.conn_id()).await;
        assert!(dispatcher.is_online(user).await);
    }

    #[tokio::test]
    async fn disconnect_drops_subscriptions() {
        let dispatcher = Dispatcher::new();
        let (user, group) = (Uuid::new_v4(), Uuid::new_v4());
        let (handle, mut rx) = dispatcher.connect(user).await;

        dispatcher.subscribe(group, &handle).await;
        assert_eq!(dispatcher.publish(group, event("one")).await, 1);
        assert_eq!(rx.try_recv().unwrap(), event("one"));

        dispatcher.disconnect(user, handle.conn_id()).await;
        assert!(!dispatcher.is_online(user).await);
        assert_eq!(dispatcher.publish(group, event("two")).await, 0);
        assert!(!dispatcher.send_to_user(user, event("three")).await);
    }

    #[tokio::test]
    async fn rebind_drops_old_connection_subscriptions() {
        let dispatcher = Dispatcher::new();
        let (user, group) = (Uuid::new_v4(), Uuid::new_v4());

        let (old, mut old_rx) = dispatcher.connect(user).await;
        dispatcher.subscribe(group, &old).await;

        let (new, mut new_rx) = dispatcher.connect(user).await;
        assert_eq!(dispatcher.publish(group, event("before")).await, 0);
        assert!(old_rx.try_recv().is_err());

        dispatcher.subscribe(group, &new).await;
        assert_eq!(dispatcher.publish(group, event("after")).await, 1);
        assert_eq!(new_rx.try_recv().unwrap(), event("after"));
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_connects_leave_no_stale_sessions() {
        let dispatcher = Dispatcher::new();
        let group = Uuid::new_v4();
        let users: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

        let mut tasks = Vec::new();
        for round in 0..25 {
            for &user in &users {
                let dispatcher = dispatcher.clone();
                tasks.push(tokio::spawn(async move {
                    let (handle, _rx) = dispatcher.connect(user).await;
                    dispatcher.subscribe(group, &handle).await;
                    dispatcher.send_to_user(user, event(&format!("round {}", round))).await;
                    dispatcher.publish(group, event("all")).await;
                    tokio::task::yield_now().await;
                    dispatcher.disconnect(user, handle.conn_id()).await;
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(dispatcher.online_count().await, 0);
        for &user in &users {
            assert!(!dispatcher.is_online(user).await);
            assert!(dispatcher.inner.sessions.lookup(user).await.is_none());
            assert!(!dispatcher.send_to_user(user, event("late")).await);
        }
        assert_eq!(dispatcher.inner.topics.subscriber_count(group).await, 0);
        assert_eq!(dispatcher.publish(group, event("late")).await, 0);
    }
}
