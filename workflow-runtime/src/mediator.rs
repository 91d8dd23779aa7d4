//! In-process notification fabric.
//!
//! Handlers register per notification type. Publishing awaits every handler
//! of that type in registration order; the first failure stops the chain and
//! is returned to the publisher.

use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Marker for types that can be published through the [`Mediator`].
pub trait Notification: Send + 'static {}

#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync {
    async fn handle(&self, notification: &mut N) -> anyhow::Result<()>;
}

type Handlers<N> = Vec<Arc<dyn NotificationHandler<N>>>;

#[derive(Default)]
pub struct Mediator {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<N: Notification>(&mut self, handler: Arc<dyn NotificationHandler<N>>) {
        let entry = self
            .handlers
            .entry(TypeId::of::<N>())
            .or_insert_with(|| Box::new(Handlers::<N>::new()));
        if let Some(handlers) = (**entry).downcast_mut::<Handlers<N>>() {
            handlers.push(handler);
        }
    }

    #[must_use]
    pub fn with_handler<N: Notification>(mut self, handler: Arc<dyn NotificationHandler<N>>) -> Self {
        self.register(handler);
        self
    }

    pub fn handler_count<N: Notification>(&self) -> usize {
        self.handlers_for::<N>().map_or(0, Vec::len)
    }

    fn handlers_for<N: Notification>(&self) -> Option<&Handlers<N>> {
        self.handlers
            .get(&TypeId::of::<N>())
            .and_then(|handlers| (**handlers).downcast_ref::<Handlers<N>>())
    }

    pub async fn publish<N: Notification>(&self, notification: &mut N) -> anyhow::Result<()> {
        let Some(handlers) = self.handlers_for::<N>() else {
            return Ok(());
        };
        for handler in handlers {
            handler.handle(notification).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping {
        visits: Vec<&'static str>,
    }

    impl Notification for Ping {}

    struct Visit(&'static str);

    #[async_trait]
    impl NotificationHandler<Ping> for Visit {
        async fn handle(&self, notification: &mut Ping) -> anyhow::Result<()> {
            notification.visits.push(self.0);
            Ok(())
        }
    }

    struct Fail;

    #[async_trait]
    impl NotificationHandler<Ping> for Fail {
        async fn handle(&self, _notification: &mut Ping) -> anyhow::Result<()> {
            anyhow::bail!("handler failed")
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let mediator = Mediator::new()
            .with_handler::<Ping>(Arc::new(Visit("first")))
            .with_handler::<Ping>(Arc::new(Visit("second")));

        let mut ping = Ping { visits: Vec::new() };
        mediator.publish(&mut ping).await.unwrap();
        assert_eq!(ping.visits, vec!["first", "second"]);
        assert_eq!(mediator.handler_count::<Ping>(), 2);
    }

    #[tokio::test]
    async fn test_failure_stops_the_chain() {
        let mediator = Mediator::new()
            .with_handler::<Ping>(Arc::new(Visit("first")))
            .with_handler::<Ping>(Arc::new(Fail))
            .with_handler::<Ping>(Arc::new(Visit("never")));

        let mut ping = Ping { visits: Vec::new() };
        let result = mediator.publish(&mut ping).await;
        assert!(result.is_err());
        assert_eq!(ping.visits, vec!["first"]);
    }

    #[tokio::test]
    async fn test_publish_without_handlers() {
        let mediator = Mediator::new();
        let mut ping = Ping { visits: Vec::new() };
        mediator.publish(&mut ping).await.unwrap();
        assert!(ping.visits.is_empty());
    }
}
