//! Live connection registry

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::MonitorMessage;

/// Open monitoring connections, shared through `AppState`
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<MonitorMessage>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection; messages broadcast afterwards arrive on the receiver
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<MonitorMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(id, tx);
        tracing::debug!("Monitoring connection {} registered", id);
        (id, rx)
    }

    pub async fn unregister(&self, id: Uuid) {
        if self.connections.write().await.remove(&id).is_some() {
            tracing::debug!("Monitoring connection {} removed", id);
        }
    }

    /// Send to every connection, dropping the ones that are gone
    pub async fn broadcast(&self, message: MonitorMessage) {
        let mut connections = self.connections.write().await;
        let before = connections.len();
        connections.retain(|_, tx| tx.send(message.clone()).is_ok());

        let dropped = before - connections.len();
        if dropped > 0 {
            tracing::debug!("Dropped {} closed monitoring connections", dropped);
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::LiveMetrics;

    fn metrics() -> MonitorMessage {
        MonitorMessage::Metrics(LiveMetrics::default())
    }

    #[tokio::test]
    async fn test_broadcast_reaches_live_connections() {
        let registry = ConnectionRegistry::new();
        let (_, mut first) = registry.register().await;
        let (_, mut second) = registry.register().await;

        registry.broadcast(metrics()).await;

        assert!(matches!(first.recv().await, Some(MonitorMessage::Metrics(_))));
        assert!(matches!(second.recv().await, Some(MonitorMessage::Metrics(_))));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_broadcast_drops_closed_connections() {
        let registry = ConnectionRegistry::new();
        let (_, mut alive) = registry.register().await;
        let (_, closed) = registry.register().await;
        drop(closed);

        registry.broadcast(metrics()).await;

        assert_eq!(registry.len().await, 1);
        assert!(alive.recv().await.is_some());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        tokio_test::block_on(async {
            let registry = ConnectionRegistry::new();
            let (id, _rx) = registry.register().await;
            registry.unregister(id).await;
            registry.unregister(id).await;
            assert_eq!(registry.len().await, 0);
        });
    }
}
