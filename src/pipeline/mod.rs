//! The request pipeline.
//!
//! Every command and query passes through an ordered list of [`Behavior`]s
//! before reaching its handler. Each behavior receives the request, the
//! per-request [`RequestContext`] and a [`Next`] handle for the rest of the
//! chain, and may act before and after calling it, or return early.
//!
//! The standard chain, outermost first:
//!
//! 1. [`LoggingBehavior`]: start and end lines with elapsed time
//! 2. [`ValidationBehavior`]: rejects invalid requests before anything else runs
//! 3. [`EventDispatchBehavior`]: publishes queued events once the commit is done
//! 4. [`TransactionBehavior`]: commands only; commit on success, roll back otherwise
//! 5. [`UnitOfWorkBehavior`]: commands only; stamps audit fields and flushes changes
//!
//! Dispatch sits outside the transaction so that subscribers only ever see
//! committed state.

mod context;
mod events;
mod logging;
mod transaction;
mod unit_of_work;
mod validation;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Failure, Outcome};
use crate::features::{self, Request, Response};

pub use context::{RequestContext, SYSTEM_USER};
pub use events::{EventBus, EventDispatchBehavior, EventDispatcher, EventSubscriber, LogEvents};
pub use logging::LoggingBehavior;
pub use transaction::TransactionBehavior;
pub use unit_of_work::UnitOfWorkBehavior;
pub use validation::ValidationBehavior;

/// One stage of the pipeline.
#[async_trait]
pub trait Behavior: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        request: &Request,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Outcome<Response>;
}

/// The remainder of the chain. Running it with no stages left invokes the
/// request's handler.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Behavior>],
}

impl<'a> Next<'a> {
    pub async fn run(self, request: &Request, ctx: &mut RequestContext) -> Outcome<Response> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(request, ctx, Next { stages: rest }).await,
            None => {
                if ctx.is_cancelled() {
                    return Err(Failure::Cancelled);
                }
                features::handle(request, ctx).await
            }
        }
    }
}

/// An ordered chain of behaviors, composed once at startup.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Behavior>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logging, validation, event dispatch, transaction and unit of work.
    pub fn standard(dispatcher: Arc<EventDispatcher>) -> Self {
        Self::new()
            .with_stage(Arc::new(LoggingBehavior))
            .with_stage(Arc::new(ValidationBehavior))
            .with_stage(Arc::new(EventDispatchBehavior::new(dispatcher)))
            .with_stage(Arc::new(TransactionBehavior))
            .with_stage(Arc::new(UnitOfWorkBehavior))
    }

    /// Append a stage. It runs inside every stage added before it.
    pub fn with_stage(mut self, stage: Arc<dyn Behavior>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn execute(&self, request: &Request, ctx: &mut RequestContext) -> Outcome<Response> {
        Next {
            stages: &self.stages,
        }
        .run(request, ctx)
        .await
    }
}
