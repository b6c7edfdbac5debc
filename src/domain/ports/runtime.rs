use async_trait::async_trait;
use futures::future::BoxFuture;
use std::time::Duration;

/// Spawns best-effort background work (system message persistence).
/// Abstracted so tests can run the work inline or drop it.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, future: BoxFuture<'static, ()>);
}

/// Sleeping between reconnect attempts goes through here
#[async_trait]
pub trait TimeService: Send + Sync {
    async fn sleep(&self, duration: Duration);
}
