use crate::domain::events::ConnectionState;
use crate::domain::ports::event_bus::EventStream;

/// Bidirectional real-time channel to the chat server.
///
/// Room signals are fire-and-forget: when the channel is down they are
/// dropped with a warning rather than queued.
pub trait RealtimeTransport: Send + Sync {
    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Ask the server to start pushing events for a conversation
    fn join_room(&self, conversation_id: &str);

    /// Stop receiving events for a conversation
    fn leave_room(&self, conversation_id: &str);

    /// Connection changes and raw inbound events
    fn subscribe(&self) -> EventStream;

    /// Tear the connection down at the end of the session
    fn shutdown(&self);
}
