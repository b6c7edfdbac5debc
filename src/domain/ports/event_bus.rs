use crate::domain::events::TransportEvent;
use futures::Stream;
use std::pin::Pin;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

pub type EventStream =
    Pin<Box<dyn Stream<Item = Result<TransportEvent, BroadcastStreamRecvError>> + Send>>;

pub trait EventBus: Send + Sync {
    /// Publish an event to all subscribers
    fn publish(&self, event: TransportEvent);

    /// Subscribe to events. A slow subscriber sees `Lagged` errors
    /// instead of blocking publishers.
    fn subscribe(&self) -> EventStream;
}
