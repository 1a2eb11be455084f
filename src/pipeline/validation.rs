use async_trait::async_trait;

use super::{Behavior, Next, RequestContext};
use crate::error::{Failure, Outcome};
use crate::features::{Request, Response};

/// Runs the request's validator. Any error stops the chain with
/// [`Failure::ValidationFailed`] carrying every broken rule.
pub struct ValidationBehavior;

#[async_trait]
impl Behavior for ValidationBehavior {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn handle(
        &self,
        request: &Request,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Outcome<Response> {
        let errors = request.validate();
        if !errors.is_empty() {
            tracing::debug!(
                request = request.name(),
                errors = errors.len(),
                "Validation rejected request"
            );
            return Err(Failure::ValidationFailed(errors));
        }

        next.run(request, ctx).await
    }
}
