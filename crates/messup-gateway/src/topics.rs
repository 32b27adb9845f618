use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use messup_types::events::GatewayEvent;

use crate::sessions::SessionHandle;

/// Group id -> connections currently subscribed to that group's broadcasts.
#[derive(Default)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<Uuid, HashMap<Uuid, SessionHandle>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, topic: Uuid, handle: &SessionHandle) {
        self.topics
            .write()
            .await
            .entry(topic)
            .or_default()
            .insert(handle.conn_id(), handle.clone());
    }

    pub async fn unsubscribe(&self, topic: Uuid, conn_id: Uuid) {
        let mut topics = self.topics.write().await;
        if let Some(subscribers) = topics.get_mut(&topic) {
            subscribers.remove(&conn_id);
            if subscribers.is_empty() {
                topics.remove(&topic);
            }
        }
    }

    /// Drop every subscription held by a connection.
    pub async fn unsubscribe_all(&self, conn_id: Uuid) {
        let mut topics = self.topics.write().await;
        topics.retain(|_, subscribers| {
            subscribers.remove(&conn_id);
            !subscribers.is_empty()
        });
    }

    /// Send `event` to every live subscriber of `topic`. Returns how many
    /// connections accepted it. Subscribers whose connection is gone are
    /// skipped.
    pub async fn publish(&self, topic: Uuid, event: &GatewayEvent) -> usize {
        let topics = self.topics.read().await;
        let Some(subscribers) = topics.get(&topic) else {
            return 0;
        };

        subscribers
            .values()
            .filter(|handle| handle.send(event.clone()))
            .count()
    }

    #[cfg(test)]
    pub async fn subscriber_count(&self, topic: Uuid) -> usize {
        self.topics
            .read()
            .await
            .get(&topic)
            .map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> GatewayEvent {
        GatewayEvent::Error {
            kind: "test".into(),
            message: "ping".into(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_only_subscribers() {
        let topics = TopicRegistry::new();
        let group = Uuid::new_v4();
        let (a, mut rx_a) = SessionHandle::channel();
        let (b, mut rx_b) = SessionHandle::channel();

        topics.subscribe(group, &a).await;
        assert_eq!(topics.publish(group, &event()).await, 1);
        assert_eq!(rx_a.try_recv().unwrap(), event());
        assert!(rx_b.try_recv().is_err());

        topics.subscribe(group, &b).await;
        topics.unsubscribe(group, a.conn_id()).await;
        assert_eq!(topics.publish(group, &event()).await, 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), event());
    }

    #[tokio::test]
    async fn unsubscribe_all_clears_every_topic() {
        let topics = TopicRegistry::new();
        let (g1, g2) = (Uuid::new_v4(), Uuid::new_v4());
        let (a, _rx) = SessionHandle::channel();

        topics.subscribe(g1, &a).await;
        topics.subscribe(g2, &a).await;
        topics.unsubscribe_all(a.conn_id()).await;

        assert_eq!(topics.subscriber_count(g1).await, 0);
        assert_eq!(topics.subscriber_count(g2).await, 0);
    }

    #[tokio::test]
    async fn publish_skips_dead_connections() {
        let topics = TopicRegistry::new();
        let group = Uuid::new_v4();
        let (a, rx) = SessionHandle::channel();
        topics.subscribe(group, &a).await;
        drop(rx);

        assert_eq!(topics.publish(group, &event()).await, 0);
        assert_eq!(topics.publish(Uuid::new_v4(), &event()).await, 0);
    }
}
