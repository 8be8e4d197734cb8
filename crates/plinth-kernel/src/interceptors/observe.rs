use crate::chain::{Interceptor, Invocation};
use crate::error::DispatchError;
use serde_json::Value;
use tracing::{Span, debug, info_span, warn};

const SPAN_KEY: &str = "plinth.span";

/// Observes every call without touching arguments or results.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInterceptor;

impl Interceptor for TracingInterceptor {
    fn name(&self) -> &str {
        "tracing"
    }

    fn before(&self, call: &mut Invocation) -> Result<(), DispatchError> {
        let span = info_span!(
            "plinth.call",
            path = %call.path,
            channel = %call.channel,
            call_id = %call.call_id,
        );
        debug!(
            parent: &span,
            handler = %call.spec.handler,
            method = %call.spec.name,
            "call started"
        );
        call.stash(SPAN_KEY, span);
        Ok(())
    }

    fn after(&self, call: &mut Invocation, result: Value) -> Result<Value, DispatchError> {
        let span = call.unstash::<Span>(SPAN_KEY).unwrap_or_else(Span::current);
        debug!(parent: &span, elapsed_ms = call.elapsed().as_millis() as u64, "call finished");
        Ok(result)
    }

    fn on_error(
        &self,
        call: &mut Invocation,
        error: DispatchError,
    ) -> Result<Value, DispatchError> {
        let span = call.unstash::<Span>(SPAN_KEY).unwrap_or_else(Span::current);
        warn!(
            parent: &span,
            kind = error.kind(),
            elapsed_ms = call.elapsed().as_millis() as u64,
            "call failed: {error}"
        );
        Err(error)
    }
}
