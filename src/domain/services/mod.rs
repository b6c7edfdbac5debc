pub mod dedup_filter;
pub mod message_normalizer;
pub mod permission_service;
pub mod state_machine;

pub use dedup_filter::*;
pub use message_normalizer::*;
pub use permission_service::*;
pub use state_machine::*;
