use crate::domain::events::TransportEvent;
use crate::domain::ports::event_bus::{EventBus, EventStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Local in-memory implementation of EventBus
#[derive(Clone)]
pub struct LocalEventBus {
    tx: broadcast::Sender<TransportEvent>,
}

impl LocalEventBus {
    /// Create a new event bus with specified capacity (at least one)
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventBus for LocalEventBus {
    fn publish(&self, event: TransportEvent) {
        // Fire-and-forget: nobody listening is not an error
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("No active subscribers for transport event: {}", e);
        }
    }

    fn subscribe(&self) -> EventStream {
        Box::pin(BroadcastStream::new(self.tx.subscribe()))
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::ConnectionState;
    use tokio_stream::StreamExt;

    #[test]
    fn test_event_bus_creation() {
        let bus = LocalEventBus::new(100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_publish_subscribe() {
        let bus = LocalEventBus::new(100);
        let mut rx = bus.subscribe();

        bus.publish(TransportEvent::ConnectionChanged(ConnectionState::Connected));

        let received = rx.next().await.unwrap().unwrap();
        match received {
            TransportEvent::ConnectionChanged(state) => assert!(state.is_connected()),
            _ => panic!("Unexpected event type"),
        }
    }
}
