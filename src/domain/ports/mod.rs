pub mod chat_api;
pub mod event_bus;
pub mod realtime_transport;
pub mod runtime;

pub use chat_api::*;
pub use event_bus::*;
pub use realtime_transport::*;
pub use runtime::*;
