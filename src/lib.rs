pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::services::{ChatCoordinator, Subscription};
pub use config::*;
pub use domain::{ChatError, ChatResult};
