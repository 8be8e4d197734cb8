use crate::chain::{Interceptor, Invocation};
use crate::error::{DispatchError, ValidationError};
use crate::kind::parse_bool;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Reserved argument that overrides the chain's commit policy for one call.
pub const AUTOCOMMIT_ARG: &str = "autocommit";

/// Source of per-call transactional handles.
pub trait ResourceProvider: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    fn acquire(&self, call: &Invocation) -> Result<Self::Handle, String>;

    fn commit(&self, handle: &Self::Handle) -> Result<(), String>;

    fn rollback(&self, handle: &Self::Handle) -> Result<(), String>;

    fn release(&self, handle: &Self::Handle);
}

/// What happens to the handle when the callable returns normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    #[default]
    Auto,
    /// Left to the callable; nothing is committed on its behalf.
    Manual,
}

/// Scopes one resource to one call: acquire, inject, commit or roll back,
/// release.
pub struct ResourceInterceptor<P: ResourceProvider> {
    name: String,
    provider: Arc<P>,
    policy: CommitPolicy,
}

impl<P: ResourceProvider> ResourceInterceptor<P> {
    /// `name` is the reserved argument the handle is injected under.
    pub fn new(name: impl Into<String>, provider: Arc<P>) -> Self {
        Self {
            name: name.into(),
            provider,
            policy: CommitPolicy::Auto,
        }
    }

    pub fn with_policy(mut self, policy: CommitPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn scope_key(&self) -> String {
        format!("plinth.resource.{}", self.name)
    }

    fn policy_for(&self, call: &Invocation) -> Result<CommitPolicy, DispatchError> {
        let Some(raw) = call.reserved_value(AUTOCOMMIT_ARG) else {
            return Ok(self.policy);
        };
        let flag = match raw {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) => parse_bool(text),
            _ => None,
        };
        match flag {
            Some(true) => Ok(CommitPolicy::Auto),
            Some(false) => Ok(CommitPolicy::Manual),
            None => Err(
                ValidationError::single(AUTOCOMMIT_ARG, format!("expected bool, got {raw}")).into(),
            ),
        }
    }
}

/// A live handle plus its release obligation. Dropping an unreleased
/// scope releases it, so a cancelled call still balances.
struct Scope<P: ResourceProvider> {
    provider: Arc<P>,
    handle: Arc<P::Handle>,
    policy: CommitPolicy,
    released: AtomicBool,
}

impl<P: ResourceProvider> Scope<P> {
    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.provider.release(&self.handle);
        }
    }
}

impl<P: ResourceProvider> Drop for Scope<P> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<P: ResourceProvider> Interceptor for ResourceInterceptor<P> {
    fn name(&self) -> &str {
        "resource"
    }

    fn reserved(&self) -> Vec<String> {
        vec![self.name.clone(), AUTOCOMMIT_ARG.to_string()]
    }

    fn before(&self, call: &mut Invocation) -> Result<(), DispatchError> {
        let policy = self.policy_for(call)?;
        let handle = self
            .provider
            .acquire(call)
            .map_err(|err| {
                DispatchError::Resource(format!("acquire `{}` failed: {err}", self.name))
            })?;
        let handle = Arc::new(handle);
        call.inject(self.name.clone(), Arc::clone(&handle) as Arc<dyn Any + Send + Sync>);
        call.stash(
            self.scope_key(),
            Scope {
                provider: Arc::clone(&self.provider),
                handle,
                policy,
                released: AtomicBool::new(false),
            },
        );
        Ok(())
    }

    fn after(&self, call: &mut Invocation, result: Value) -> Result<Value, DispatchError> {
        let Some(scope) = call.unstash::<Scope<P>>(&self.scope_key()) else {
            return Ok(result);
        };
        if scope.policy == CommitPolicy::Auto
            && let Err(err) = self.provider.commit(&scope.handle)
        {
            if let Err(rollback_err) = self.provider.rollback(&scope.handle) {
                warn!(
                    resource = %self.name,
                    "rollback after failed commit also failed: {rollback_err}"
                );
            }
            scope.release();
            return Err(DispatchError::Resource(format!("commit `{}` failed: {err}", self.name)));
        }
        scope.release();
        Ok(result)
    }

    fn on_error(
        &self,
        call: &mut Invocation,
        error: DispatchError,
    ) -> Result<Value, DispatchError> {
        if let Some(scope) = call.unstash::<Scope<P>>(&self.scope_key()) {
            if let Err(rollback_err) = self.provider.rollback(&scope.handle) {
                warn!(resource = %self.name, "rollback failed: {rollback_err}");
            }
            scope.release();
        }
        Err(error)
    }
}
