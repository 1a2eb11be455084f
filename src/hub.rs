//! The single entry point for submitting commands and queries.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthProvider, SqliteIdentity};
use crate::clock::{Clock, SystemClock};
use crate::db::Database;
use crate::error::{Failure, Outcome};
use crate::features::{Message, Request, Response};
use crate::models::{AppUser, DomainEvent, SessionToken};
use crate::pipeline::{
    Behavior, EventBus, EventDispatcher, EventSubscriber, LogEvents, Pipeline, RequestContext,
};

/// Committed events a slow listener may fall behind by before losing the
/// oldest.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Per-call settings.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Identity stamped into audit fields. `None` stamps "system".
    pub user: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn as_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Owns the store, the clock, the identity provider, the composed pipeline
/// and the broadcast of committed events. Cheap to clone.
#[derive(Clone)]
pub struct FamilyHub {
    db: Database,
    clock: Arc<dyn Clock>,
    identity: Arc<dyn AuthProvider>,
    pipeline: Arc<Pipeline>,
    events: EventBus,
}

impl FamilyHub {
    pub fn builder(db: Database) -> FamilyHubBuilder {
        FamilyHubBuilder {
            db,
            clock: Arc::new(SystemClock),
            identity: Arc::new(SqliteIdentity),
            subscribers: Vec::new(),
            extra_stages: Vec::new(),
            event_capacity: EVENT_BUS_CAPACITY,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Receiver for every event published after a commit from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Submit a typed request as the system user.
    pub async fn send<M: Message>(&self, message: M) -> Outcome<M::Output> {
        self.send_with(message, RequestOptions::default()).await
    }

    pub async fn send_with<M: Message>(
        &self,
        message: M,
        options: RequestOptions,
    ) -> Outcome<M::Output> {
        let request: Request = message.into();
        let name = request.name();
        let response = self.dispatch(request, options).await?;
        M::extract(response)
            .ok_or_else(|| Failure::Unexpected(anyhow!("{} returned a mismatched response", name)))
    }

    /// Submit an untyped request.
    pub async fn dispatch(&self, request: Request, options: RequestOptions) -> Outcome<Response> {
        let mut ctx = RequestContext::new(
            self.db.clone(),
            self.clock.clone(),
            self.identity.clone(),
            options.user,
            options.cancel.unwrap_or_default(),
        );
        self.pipeline.execute(&request, &mut ctx).await
    }

    /// Resolve a session token to its user, outside the pipeline.
    pub async fn authenticate(&self, token: &SessionToken) -> anyhow::Result<Option<AppUser>> {
        let conn = self.db.lock().await;
        self.identity.authenticate(&conn, token)
    }
}

pub struct FamilyHubBuilder {
    db: Database,
    clock: Arc<dyn Clock>,
    identity: Arc<dyn AuthProvider>,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    extra_stages: Vec<Arc<dyn Behavior>>,
    event_capacity: usize,
}

impl FamilyHubBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn identity(mut self, identity: Arc<dyn AuthProvider>) -> Self {
        self.identity = identity;
        self
    }

    pub fn subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Add a stage inside the standard chain, just before the handler.
    pub fn stage(mut self, stage: Arc<dyn Behavior>) -> Self {
        self.extra_stages.push(stage);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> FamilyHub {
        let events = EventBus::new(self.event_capacity);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Arc::new(LogEvents));
        for subscriber in self.subscribers {
            dispatcher.subscribe(subscriber);
        }
        dispatcher.subscribe(Arc::new(events.clone()));

        let pipeline = self
            .extra_stages
            .into_iter()
            .fold(Pipeline::standard(Arc::new(dispatcher)), Pipeline::with_stage);

        FamilyHub {
            db: self.db,
            clock: self.clock,
            identity: self.identity,
            pipeline: Arc::new(pipeline),
            events,
        }
    }
}
