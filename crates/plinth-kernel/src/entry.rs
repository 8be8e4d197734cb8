//! Method entries: the immutable declaration, the bound callable, and the
//! argument containers that flow between them.

use crate::chain::{InterceptorChain, Invocation};
use crate::context::{CallContext, Channel, Outcome};
use crate::error::{DispatchError, HandlerError};
use crate::kind::ParamKind;
use crate::schema::{ParamSpec, Schema};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

pub type HandlerResult = Result<Value, HandlerError>;
pub type BlockingFn = dyn Fn(CallArgs) -> HandlerResult + Send + Sync;
pub type SuspendingFn = dyn Fn(CallArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// Unvalidated input as it arrived on a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawArgs {
    pub positional: Vec<Value>,
    pub named: BTreeMap<String, Value>,
}

impl RawArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            named: BTreeMap::new(),
        }
    }

    pub fn from_object(object: Map<String, Value>) -> Self {
        Self {
            positional: Vec::new(),
            named: object.into_iter().collect(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(key.into(), value.into());
        self
    }
}

/// Validated arguments handed to a callable, plus any resources injected
/// by interceptors under reserved names.
#[derive(Clone, Default)]
pub struct CallArgs {
    values: Map<String, Value>,
    resources: BTreeMap<String, Arc<dyn Any + Send + Sync>>,
}

impl CallArgs {
    pub fn from_values(values: Map<String, Value>) -> Self {
        Self {
            values,
            resources: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    pub fn int(&self, name: &str) -> Result<i64, HandlerError> {
        self.get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| missing(name, "int"))
    }

    pub fn float(&self, name: &str) -> Result<f64, HandlerError> {
        self.get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| missing(name, "float"))
    }

    pub fn str(&self, name: &str) -> Result<&str, HandlerError> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| missing(name, "str"))
    }

    pub fn bool(&self, name: &str) -> Result<bool, HandlerError> {
        self.get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| missing(name, "bool"))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn inject(&mut self, name: impl Into<String>, resource: Arc<dyn Any + Send + Sync>) {
        self.resources.insert(name.into(), resource);
    }

    /// Fetch an injected resource by reserved name.
    pub fn resource<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, HandlerError> {
        let resource = self
            .resources
            .get(name)
            .cloned()
            .ok_or_else(|| HandlerError::new(format!("resource `{name}` was not injected")))?;
        resource
            .downcast::<T>()
            .map_err(|_| HandlerError::new(format!("resource `{name}` has an unexpected type")))
    }

    pub(crate) fn into_resources(self) -> BTreeMap<String, Arc<dyn Any + Send + Sync>> {
        self.resources
    }
}

fn missing(name: &str, kind: &str) -> HandlerError {
    HandlerError::new(format!("argument `{name}` is missing or not a {kind}"))
}

impl Debug for CallArgs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallArgs")
            .field("values", &self.values)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-channel visibility of a method or application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exposure {
    pub cli: bool,
    pub network: bool,
}

impl Exposure {
    pub const ALL: Self = Self {
        cli: true,
        network: true,
    };
    pub const CLI_ONLY: Self = Self {
        cli: true,
        network: false,
    };
    pub const NETWORK_ONLY: Self = Self {
        cli: false,
        network: true,
    };
    pub const HIDDEN: Self = Self {
        cli: false,
        network: false,
    };

    pub fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Cli => self.cli,
            Channel::Network => self.network,
        }
    }

    pub fn intersect(self, other: Self) -> Self {
        Self {
            cli: self.cli && other.cli,
            network: self.network && other.network,
        }
    }
}

impl Default for Exposure {
    fn default() -> Self {
        Self::ALL
    }
}

/// Native execution model of a callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionModel {
    Blocking,
    Suspending,
}

/// Immutable declaration of one method. Exists before any handler
/// instance does.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpec {
    /// Registered name, after prefix stripping.
    pub name: String,
    /// Name as declared.
    pub declared_name: String,
    /// Owning handler type.
    pub handler: String,
    pub params: Vec<ParamSpec>,
    pub returns: Option<ParamKind>,
    pub description: Option<String>,
    pub exposure: Exposure,
    pub execution: ExecutionModel,
    pub schema: Arc<Schema>,
}

#[derive(Clone)]
pub enum Callable {
    Blocking(Arc<BlockingFn>),
    Suspending(Arc<SuspendingFn>),
}

impl Callable {
    pub fn model(&self) -> ExecutionModel {
        match self {
            Self::Blocking(_) => ExecutionModel::Blocking,
            Self::Suspending(_) => ExecutionModel::Suspending,
        }
    }
}

/// How the innermost step runs the callable. Chosen by the bridging
/// interceptor; absent a bridge, only native matches run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPlan {
    /// Blocking callable on the caller's thread.
    Inline,
    /// Blocking callable moved to the scheduler's blocking pool.
    Offload,
    /// Suspending callable returned as a pending computation.
    Await,
    /// Suspending callable driven on a transient scheduler while the
    /// caller's thread blocks.
    DriveToCompletion,
}

impl ExecutionPlan {
    /// Plan used when no interceptor chose one.
    pub fn native(model: ExecutionModel, context: &CallContext) -> Result<Self, DispatchError> {
        match (model, context) {
            (ExecutionModel::Blocking, _) => Ok(Self::Inline),
            (ExecutionModel::Suspending, CallContext::Scheduled(_)) => Ok(Self::Await),
            (ExecutionModel::Suspending, CallContext::Blocking) => Err(DispatchError::Bridge(
                "suspending method called from a blocking context without a bridge".to_string(),
            )),
        }
    }
}

/// A bound, callable registry entry.
#[derive(Clone)]
pub struct MethodEntry {
    pub spec: Arc<MethodSpec>,
    pub callable: Callable,
    pub chain: Arc<InterceptorChain>,
}

impl Debug for MethodEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodEntry")
            .field("spec", &self.spec)
            .field("chain", &self.chain.names())
            .finish()
    }
}

enum Step {
    Ready(Result<Value, DispatchError>),
    Pending(BoxFuture<'static, Result<Value, DispatchError>>),
}

impl MethodEntry {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Run the entry through its interceptor chain.
    pub fn invoke(
        &self,
        path: &str,
        raw: RawArgs,
        channel: Channel,
        context: CallContext,
    ) -> Outcome {
        let chain = Arc::clone(&self.chain);
        let mut call = Invocation::new(
            path,
            Arc::clone(&self.spec),
            raw,
            channel,
            context,
            chain.reserved_names(),
        );

        let entered = match chain.enter(&mut call) {
            Ok(entered) => entered,
            Err((entered, err)) => {
                return Outcome::Ready(chain.unwind(&mut call, entered, Err(err)));
            }
        };

        let step = match self.prepare(&mut call) {
            Ok((args, plan)) => run(&self.callable, args, plan, &call.context),
            Err(err) => Step::Ready(Err(err)),
        };

        match step {
            Step::Ready(result) => Outcome::Ready(chain.unwind(&mut call, entered, result)),
            Step::Pending(future) => Outcome::Pending(
                async move {
                    let result = future.await;
                    chain.unwind(&mut call, entered, result)
                }
                .boxed(),
            ),
        }
    }

    fn prepare(&self, call: &mut Invocation) -> Result<(CallArgs, ExecutionPlan), DispatchError> {
        let args = call.take_args()?;
        let plan = match call.plan.clone() {
            Some(plan) => plan,
            None => ExecutionPlan::native(self.callable.model(), &call.context)?,
        };
        Ok((args, plan))
    }
}

fn run(callable: &Callable, args: CallArgs, plan: ExecutionPlan, context: &CallContext) -> Step {
    match (plan, callable) {
        (ExecutionPlan::Inline, Callable::Blocking(f)) => {
            let f = Arc::clone(f);
            Step::Ready(catch_unwind(AssertUnwindSafe(|| f(args))).map_or_else(
                |panic| Err(panicked(panic)),
                |result| result.map_err(DispatchError::from),
            ))
        }
        (ExecutionPlan::Offload, Callable::Blocking(f)) => {
            let CallContext::Scheduled(handle) = context else {
                return Step::Ready(Err(DispatchError::Bridge(
                    "offload requires a scheduled context".to_string(),
                )));
            };
            let f = Arc::clone(f);
            let task = handle.spawn_blocking(move || f(args));
            Step::Pending(
                async move {
                    match task.await {
                        Ok(result) => result.map_err(DispatchError::from),
                        Err(err) if err.is_panic() => Err(panicked(err.into_panic())),
                        Err(err) => {
                            Err(DispatchError::Bridge(format!("offloaded call failed: {err}")))
                        }
                    }
                }
                .boxed(),
            )
        }
        (ExecutionPlan::Await, Callable::Suspending(f)) => {
            if !context.is_scheduled() {
                return Step::Ready(Err(DispatchError::Bridge(
                    "cannot await without a scheduled context".to_string(),
                )));
            }
            let future = f(args);
            Step::Pending(
                async move {
                    match AssertUnwindSafe(future).catch_unwind().await {
                        Ok(result) => result.map_err(DispatchError::from),
                        Err(panic) => Err(panicked(panic)),
                    }
                }
                .boxed(),
            )
        }
        (ExecutionPlan::DriveToCompletion, Callable::Suspending(f)) => {
            Step::Ready(drive_to_completion(f(args)))
        }
        (plan, callable) => Step::Ready(Err(DispatchError::Bridge(format!(
            "plan {plan:?} cannot run a {:?} callable",
            callable.model()
        )))),
    }
}

fn drive_to_completion(future: BoxFuture<'static, HandlerResult>) -> Result<Value, DispatchError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(DispatchError::Bridge(
            "cannot block inside a running scheduler; call with a scheduled context".to_string(),
        ));
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            DispatchError::Bridge(format!("failed to start transient scheduler: {err}"))
        })?;
    match runtime.block_on(AssertUnwindSafe(future).catch_unwind()) {
        Ok(result) => result.map_err(DispatchError::from),
        Err(panic) => Err(panicked(panic)),
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> DispatchError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    DispatchError::Runtime(HandlerError::new(format!("handler panicked: {message}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resources_downcast_by_name() {
        let mut args = CallArgs::default();
        args.inject("ledger", Arc::new(7_u32));
        let value = args.resource::<u32>("ledger").expect("ledger should be injected");
        assert_eq!(*value, 7);
        assert!(args.resource::<String>("ledger").is_err());
        assert!(args.resource::<u32>("cursor").is_err());
    }

    #[test]
    fn typed_accessors_report_missing_arguments() {
        let mut values = Map::new();
        values.insert("a".into(), json!(3));
        let args = CallArgs::from_values(values);
        assert_eq!(args.int("a").expect("a is an int"), 3);
        assert!(args.str("a").is_err());
        assert!(args.int("b").is_err());
    }

    #[test]
    fn native_plan_refuses_unbridged_suspension() {
        let plan = ExecutionPlan::native(ExecutionModel::Suspending, &CallContext::Blocking);
        assert!(matches!(plan, Err(DispatchError::Bridge(_))));
        assert_eq!(
            ExecutionPlan::native(ExecutionModel::Blocking, &CallContext::Blocking),
            Ok(ExecutionPlan::Inline)
        );
    }
}
