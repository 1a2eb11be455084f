use async_trait::async_trait;

use super::{Behavior, Next, RequestContext};
use crate::error::{Failure, Outcome};
use crate::features::{Request, Response};

/// Wraps a command in one database transaction.
///
/// Commits only when the inner stages succeed and the request has not been
/// cancelled. Failures and cancellation roll back every write the request made.
/// Queries pass straight through.
pub struct TransactionBehavior;

#[async_trait]
impl Behavior for TransactionBehavior {
    fn name(&self) -> &'static str {
        "transaction"
    }

    async fn handle(
        &self,
        request: &Request,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Outcome<Response> {
        if !request.is_command() {
            return next.run(request, ctx).await;
        }
        if ctx.is_cancelled() {
            return Err(Failure::Cancelled);
        }

        ctx.begin().await?;

        let cancel = ctx.cancellation();
        let result = tokio::select! {
            result = next.run(request, ctx) => result,
            _ = cancel.cancelled() => Err(Failure::Cancelled),
        };

        match result {
            Ok(response) if !ctx.is_cancelled() => {
                ctx.commit()?;
                Ok(response)
            }
            Ok(_) => {
                tracing::warn!(request = request.name(), "Cancelled before commit, rolling back");
                ctx.rollback();
                Err(Failure::Cancelled)
            }
            Err(failure) => {
                ctx.rollback();
                Err(failure)
            }
        }
    }
}
