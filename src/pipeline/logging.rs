use std::time::Instant;

use async_trait::async_trait;

use super::{Behavior, Next, RequestContext};
use crate::error::{Failure, Outcome};
use crate::features::{Request, Response};

/// Logs `[START] <name>` and `[END] <name> - <ms>ms` around the rest of the
/// chain, whatever its outcome.
pub struct LoggingBehavior;

#[async_trait]
impl Behavior for LoggingBehavior {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(
        &self,
        request: &Request,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Outcome<Response> {
        let name = request.name();
        tracing::info!(request = name, "[START] {}", name);

        let started = Instant::now();
        let result = next.run(request, ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {}
            Err(Failure::Unexpected(e)) => {
                tracing::error!(request = name, "Request failed: {:#}", e);
            }
            Err(failure) => {
                tracing::warn!(request = name, kind = failure.kind(), "Request failed: {}", failure);
            }
        }

        tracing::info!(request = name, elapsed_ms, "[END] {} - {}ms", name, elapsed_ms);
        result
    }
}
