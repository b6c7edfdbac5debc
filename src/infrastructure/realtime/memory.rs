use crate::domain::events::{ConnectionState, TransportEvent};
use crate::domain::ports::event_bus::{EventBus, EventStream};
use crate::domain::ports::realtime_transport::RealtimeTransport;
use crate::infrastructure::realtime::frame::RoomSignal;
use crate::shared::events::LocalEventBus;
use serde_json::Value;
use std::sync::{Mutex, PoisonError, RwLock};

/// In-process transport. Records room signals instead of sending them and
/// lets the caller inject inbound events, so the coordinator can run
/// without a server (tests, offline console).
pub struct InMemoryTransport {
    state: RwLock<ConnectionState>,
    bus: LocalEventBus,
    sent_signals: Mutex<Vec<RoomSignal>>,
}

impl InMemoryTransport {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state: RwLock::new(state),
            bus: LocalEventBus::default(),
            sent_signals: Mutex::new(Vec::new()),
        }
    }

    pub fn connected() -> Self {
        Self::new(ConnectionState::Connected)
    }

    pub fn disconnected() -> Self {
        Self::new(ConnectionState::Disconnected)
    }

    pub fn set_state(&self, next: ConnectionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        self.bus.publish(TransportEvent::ConnectionChanged(next));
    }

    /// Deliver a `new_message` payload as if the server had broadcast it
    pub fn inject_message(&self, payload: Value) {
        self.bus.publish(TransportEvent::NewMessage(payload));
    }

    /// Deliver a `conversation_update` payload
    pub fn inject_conversation_update(&self, payload: Value) {
        self.bus.publish(TransportEvent::ConversationUpdated(payload));
    }

    /// Retrieve all room signals that have been sent
    pub fn sent_signals(&self) -> Vec<RoomSignal> {
        self.sent_signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, signal: RoomSignal) {
        if !self.is_connected() {
            tracing::warn!("In-memory transport not connected; dropping {:?}", signal);
            return;
        }
        self.sent_signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(signal);
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::connected()
    }
}

impl RealtimeTransport for InMemoryTransport {
    fn state(&self) -> ConnectionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn join_room(&self, conversation_id: &str) {
        self.record(RoomSignal::Join(conversation_id.to_string()));
    }

    fn leave_room(&self, conversation_id: &str) {
        self.record(RoomSignal::Leave(conversation_id.to_string()));
    }

    fn subscribe(&self) -> EventStream {
        self.bus.subscribe()
    }

    fn shutdown(&self) {
        self.set_state(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_records_signals_when_connected() {
        let transport = InMemoryTransport::connected();
        transport.join_room("c1");
        transport.leave_room("c1");
        assert_eq!(
            transport.sent_signals(),
            vec![
                RoomSignal::Join("c1".to_string()),
                RoomSignal::Leave("c1".to_string())
            ]
        );
    }

    #[test]
    fn test_drops_signals_when_disconnected() {
        let transport = InMemoryTransport::disconnected();
        transport.join_room("c1");
        assert!(transport.sent_signals().is_empty());
    }

    #[tokio::test]
    async fn test_injected_events_are_published() {
        let transport = InMemoryTransport::connected();
        let mut events = transport.subscribe();
        transport.inject_message(json!({"_id": "m1"}));

        match events.next().await.unwrap().unwrap() {
            TransportEvent::NewMessage(payload) => assert_eq!(payload["_id"], "m1"),
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}
