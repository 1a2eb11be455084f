use async_trait::async_trait;

use super::{Behavior, Next, RequestContext};
use crate::error::Outcome;
use crate::features::{Request, Response};

/// After a command's handler succeeds, saves the change set into the open
/// transaction. Audit fields are stamped here with one clock reading.
pub struct UnitOfWorkBehavior;

#[async_trait]
impl Behavior for UnitOfWorkBehavior {
    fn name(&self) -> &'static str {
        "unit_of_work"
    }

    async fn handle(
        &self,
        request: &Request,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Outcome<Response> {
        let response = next.run(request, ctx).await?;
        if !request.is_command() {
            return Ok(response);
        }

        let rows = ctx.save_changes()?;
        tracing::debug!(request = request.name(), rows, "Saved changes");
        Ok(response)
    }
}
