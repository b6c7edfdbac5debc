pub mod chat_coordinator;
pub mod subscriptions;

pub use chat_coordinator::ChatCoordinator;
pub use subscriptions::{SubscriberList, Subscription};
