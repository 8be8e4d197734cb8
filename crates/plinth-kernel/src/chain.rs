//! The interceptor chain: ordered wrappers around every invocation.
//!
//! ```text
//!   before 1 ─▶ before 2 ─▶ … ─▶ before N ─▶ callable
//!                                              │
//!   after 1  ◀─ after 2  ◀─ … ◀─ after N  ◀────┘   (on_error on failure)
//! ```
//!
//! A failing `before` at layer k short-circuits: the callable and the
//! layers after k never run, and layers `k-1..=1` see the error through
//! `on_error`. Every layer that entered is unwound exactly once.

use crate::context::{CallContext, Channel};
use crate::entry::{CallArgs, ExecutionPlan, MethodSpec, RawArgs};
use crate::error::DispatchError;
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A composable wrapper around a bare callable.
///
/// The default hooks are identity: an interceptor that overrides nothing
/// leaves arguments, results, and errors untouched.
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    /// Argument names this interceptor supplies itself. They are excluded
    /// from every schema synthesized under a chain containing it.
    fn reserved(&self) -> Vec<String> {
        Vec::new()
    }

    fn before(&self, _call: &mut Invocation) -> Result<(), DispatchError> {
        Ok(())
    }

    fn after(&self, _call: &mut Invocation, result: Value) -> Result<Value, DispatchError> {
        Ok(result)
    }

    /// Returning `Ok` converts the error into a result; outer layers then
    /// see it through `after`.
    fn on_error(
        &self,
        _call: &mut Invocation,
        error: DispatchError,
    ) -> Result<Value, DispatchError> {
        Err(error)
    }
}

/// Ordered interceptors shared by every entry declared through one `Api`.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    layers: Vec<Arc<dyn Interceptor>>,
    reserved: Arc<BTreeSet<String>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observability, validation, then bridging. Resource interceptors go
    /// between validation and the bridge; see [`InterceptorChain::standard_with`].
    pub fn standard() -> Self {
        Self::new()
            .with(crate::interceptors::TracingInterceptor)
            .with(crate::interceptors::ValidationInterceptor)
            .with(crate::interceptors::BridgeInterceptor)
    }

    /// The standard order with one resource-managing layer in its place.
    pub fn standard_with<I: Interceptor + 'static>(resource: I) -> Self {
        Self::new()
            .with(crate::interceptors::TracingInterceptor)
            .with(crate::interceptors::ValidationInterceptor)
            .with(resource)
            .with(crate::interceptors::BridgeInterceptor)
    }

    pub fn with<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.push(Arc::new(interceptor));
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        let mut reserved = (*self.reserved).clone();
        reserved.extend(interceptor.reserved());
        self.reserved = Arc::new(reserved);
        self.layers.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    pub fn reserved_names(&self) -> Arc<BTreeSet<String>> {
        Arc::clone(&self.reserved)
    }

    /// Run `before` hooks in order. Returns how many layers entered; on
    /// failure, the count excludes the failing layer.
    pub(crate) fn enter(&self, call: &mut Invocation) -> Result<usize, (usize, DispatchError)> {
        for (index, layer) in self.layers.iter().enumerate() {
            layer.before(call).map_err(|err| (index, err))?;
        }
        Ok(self.layers.len())
    }

    /// Fold the outcome back out through the first `entered` layers in
    /// reverse order.
    pub(crate) fn unwind(
        &self,
        call: &mut Invocation,
        entered: usize,
        outcome: Result<Value, DispatchError>,
    ) -> Result<Value, DispatchError> {
        self.layers[..entered]
            .iter()
            .rev()
            .fold(outcome, |state, layer| match state {
                Ok(value) => layer.after(call, value),
                Err(err) => layer.on_error(call, err),
            })
    }
}

/// Per-call state visible to interceptors.
pub struct Invocation {
    pub call_id: Uuid,
    pub path: String,
    pub channel: Channel,
    pub context: CallContext,
    pub spec: Arc<MethodSpec>,
    pub raw: RawArgs,
    /// Validated arguments once a validating layer has run.
    pub args: Option<CallArgs>,
    /// Execution plan chosen by a bridging layer.
    pub plan: Option<ExecutionPlan>,
    reserved: Arc<BTreeSet<String>>,
    injected: CallArgs,
    extensions: BTreeMap<String, Box<dyn Any + Send>>,
    started: Instant,
}

impl Invocation {
    pub(crate) fn new(
        path: &str,
        spec: Arc<MethodSpec>,
        raw: RawArgs,
        channel: Channel,
        context: CallContext,
        reserved: Arc<BTreeSet<String>>,
    ) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            path: path.to_string(),
            channel,
            context,
            spec,
            raw,
            args: None,
            plan: None,
            reserved,
            injected: CallArgs::default(),
            extensions: BTreeMap::new(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// A caller-supplied value for a reserved name.
    pub fn reserved_value(&self, name: &str) -> Option<&Value> {
        if self.reserved.contains(name) {
            self.raw.named.get(name)
        } else {
            None
        }
    }

    /// Validate the raw input against the method's schema.
    pub fn bind_args(&mut self) -> Result<(), DispatchError> {
        if self.args.is_none() {
            let args = self.spec.schema.validate(&self.raw, &self.reserved)?;
            self.args = Some(args);
        }
        Ok(())
    }

    /// Make `resource` available to the callable under `name`.
    pub fn inject(&mut self, name: impl Into<String>, resource: Arc<dyn Any + Send + Sync>) {
        self.injected.inject(name, resource);
    }

    /// Final arguments for the callable: validated values plus injections.
    pub(crate) fn take_args(&mut self) -> Result<CallArgs, DispatchError> {
        self.bind_args()?;
        let mut args = self.args.take().unwrap_or_default();
        for (name, resource) in std::mem::take(&mut self.injected).into_resources() {
            args.inject(name, resource);
        }
        Ok(args)
    }

    pub fn stash<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.extensions.insert(key.into(), Box::new(value));
    }

    pub fn stashed<T: Any + Send>(&self, key: &str) -> Option<&T> {
        self.extensions.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn unstash<T: Any + Send>(&mut self, key: &str) -> Option<T> {
        let boxed = self.extensions.remove(key)?;
        boxed.downcast::<T>().ok().map(|v| *v)
    }
}
