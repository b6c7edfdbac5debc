pub mod entities;
pub mod errors;
pub mod events;
pub mod ports;
pub mod services;

pub use errors::{ChatError, ChatResult};
