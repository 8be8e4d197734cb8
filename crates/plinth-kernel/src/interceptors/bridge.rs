use crate::chain::{Interceptor, Invocation};
use crate::context::CallContext;
use crate::entry::{ExecutionModel, ExecutionPlan};
use crate::error::DispatchError;
use tracing::trace;

/// Reconciles the callable's execution model with the caller's context.
///
/// | callable   | caller      | plan                |
/// |------------|-------------|---------------------|
/// | blocking   | blocking    | inline              |
/// | blocking   | scheduled   | offload             |
/// | suspending | scheduled   | await (pending)     |
/// | suspending | blocking    | drive to completion |
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeInterceptor;

impl BridgeInterceptor {
    pub fn plan(model: ExecutionModel, context: &CallContext) -> ExecutionPlan {
        match (model, context) {
            (ExecutionModel::Blocking, CallContext::Blocking) => ExecutionPlan::Inline,
            (ExecutionModel::Blocking, CallContext::Scheduled(_)) => ExecutionPlan::Offload,
            (ExecutionModel::Suspending, CallContext::Scheduled(_)) => ExecutionPlan::Await,
            (ExecutionModel::Suspending, CallContext::Blocking) => ExecutionPlan::DriveToCompletion,
        }
    }
}

impl Interceptor for BridgeInterceptor {
    fn name(&self) -> &str {
        "bridge"
    }

    fn before(&self, call: &mut Invocation) -> Result<(), DispatchError> {
        let plan = Self::plan(call.spec.execution, &call.context);
        trace!(path = %call.path, ?plan, "execution plan");
        call.plan = Some(plan);
        Ok(())
    }
}
