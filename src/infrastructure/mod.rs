pub mod http;
pub mod observability;
pub mod realtime;
pub mod runtime;
