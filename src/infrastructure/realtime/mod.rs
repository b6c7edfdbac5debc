pub mod frame;
pub mod memory;
pub mod socket;

pub use memory::InMemoryTransport;
pub use socket::{SocketTransport, SocketTransportConfig, TransportError};
