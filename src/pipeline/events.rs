use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{Behavior, Next, RequestContext};
use crate::error::Outcome;
use crate::features::{Request, Response};
use crate::models::DomainEvent;

/// Receives domain events after the transaction that raised them commits.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &str;

    /// An error is logged and otherwise ignored. The request has already
    /// committed.
    async fn on_event(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Fans committed events out to every registered subscriber, in order.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub async fn dispatch(&self, events: &[DomainEvent]) {
        for event in events {
            for subscriber in &self.subscribers {
                if let Err(e) = subscriber.on_event(event).await {
                    tracing::warn!(
                        subscriber = subscriber.name(),
                        event = event.name(),
                        entity_id = %event.entity_id(),
                        "Event subscriber failed: {:#}",
                        e
                    );
                }
            }
        }
    }
}

/// Publishes the request's events once the rest of the chain has returned,
/// provided its transaction committed. Cancellation after the commit does not
/// stop dispatch.
pub struct EventDispatchBehavior {
    dispatcher: Arc<EventDispatcher>,
}

impl EventDispatchBehavior {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Behavior for EventDispatchBehavior {
    fn name(&self) -> &'static str {
        "event_dispatch"
    }

    async fn handle(
        &self,
        request: &Request,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Outcome<Response> {
        let result = next.run(request, ctx).await;

        let events = ctx.take_outbox();
        if !events.is_empty() {
            tracing::debug!(request = request.name(), count = events.len(), "Dispatching events");
            self.dispatcher.dispatch(&events).await;
        }

        result
    }
}

/// Writes every event to the log.
pub struct LogEvents;

#[async_trait]
impl EventSubscriber for LogEvents {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_event(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let task = event.task();
        tracing::info!(
            event = event.name(),
            task_id = %task.id,
            title = %task.title,
            "Domain event"
        );
        Ok(())
    }
}

/// Broadcast channel for in-process listeners.
///
/// Events sent while nobody is subscribed are dropped. A receiver that falls
/// more than `capacity` events behind loses the oldest ones.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventSubscriber for EventBus {
    fn name(&self) -> &str {
        "bus"
    }

    async fn on_event(&self, event: &DomainEvent) -> anyhow::Result<()> {
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!(event = event.name(), "No bus receivers");
        }
        Ok(())
    }
}
