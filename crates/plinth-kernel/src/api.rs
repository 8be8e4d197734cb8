//! Explicit method declaration for a handler type.
//!
//! An [`Api`] lists the methods of a handler type `H` together with their
//! parameter schemas. Declaring needs no instance of `H`; binding one
//! produces a [`Binding`] that can be mounted into a registry tree.

use crate::chain::InterceptorChain;
use crate::describe::{Description, MethodDescription};
use crate::entry::{
    CallArgs, Callable, ExecutionModel, Exposure, HandlerResult, MethodEntry, MethodSpec,
};
use crate::error::RegistryError;
use crate::kind::ParamKind;
use crate::schema::{ParamSpec, Schema, is_identifier};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

type BlockingMethod<H> = Arc<dyn Fn(&H, CallArgs) -> HandlerResult + Send + Sync>;
type SuspendingMethod<H> =
    Arc<dyn Fn(Arc<H>, CallArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

enum Unbound<H> {
    Blocking(BlockingMethod<H>),
    Suspending(SuspendingMethod<H>),
}

struct Declared<H> {
    spec: Arc<MethodSpec>,
    body: Unbound<H>,
}

/// Stable handle to one declared method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodToken {
    pub index: usize,
    pub name: String,
}

/// Declaration table for handler type `H`.
pub struct Api<H> {
    name: String,
    description: Option<String>,
    prefix: Option<String>,
    chain: Arc<InterceptorChain>,
    methods: Vec<Declared<H>>,
}

impl<H: Send + Sync + 'static> Api<H> {
    /// New declaration table using the standard interceptor chain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            prefix: None,
            chain: Arc::new(InterceptorChain::standard()),
            methods: Vec::new(),
        }
    }

    /// Replace the interceptor chain. Reserved names are taken from the
    /// chain in effect when each method is declared.
    pub fn with_chain(mut self, chain: InterceptorChain) -> Self {
        self.chain = Arc::new(chain);
        self
    }

    /// Strip `prefix` from declared method names when registering them.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&mut self, name: impl Into<String>) -> MethodBuilder<'_, H> {
        MethodBuilder {
            api: self,
            name: name.into(),
            params: Vec::new(),
            returns: None,
            description: None,
            exposure: Exposure::ALL,
        }
    }

    pub fn spec(&self, token: &MethodToken) -> Option<&MethodSpec> {
        self.methods.get(token.index).map(|m| m.spec.as_ref())
    }

    pub fn specs(&self) -> impl Iterator<Item = &MethodSpec> {
        self.methods.iter().map(|m| m.spec.as_ref())
    }

    /// Describe the type's full surface without an instance.
    pub fn describe_type(&self) -> Description {
        Description {
            name: self.name.clone(),
            path: self.name.clone(),
            description: self.description.clone(),
            methods: self
                .methods
                .iter()
                .map(|m| {
                    let path = format!("{}.{}", self.name, m.spec.name);
                    MethodDescription::from_spec(&m.spec, &path, m.spec.exposure)
                })
                .collect(),
            children: Vec::new(),
        }
    }

    /// Bind every declared method to `handler`.
    pub fn bind(&self, handler: Arc<H>) -> Binding {
        let entries = self
            .methods
            .iter()
            .map(|declared| {
                let callable = match &declared.body {
                    Unbound::Blocking(f) => {
                        let f = Arc::clone(f);
                        let handler = Arc::clone(&handler);
                        Callable::Blocking(Arc::new(move |args| f(&handler, args)))
                    }
                    Unbound::Suspending(f) => {
                        let f = Arc::clone(f);
                        let handler = Arc::clone(&handler);
                        Callable::Suspending(Arc::new(move |args| f(Arc::clone(&handler), args)))
                    }
                };
                Arc::new(MethodEntry {
                    spec: Arc::clone(&declared.spec),
                    callable,
                    chain: Arc::clone(&self.chain),
                })
            })
            .collect();
        Binding {
            name: self.name.clone(),
            description: self.description.clone(),
            exposure: Exposure::ALL,
            entries,
            children: Vec::new(),
        }
    }

    fn registered_name(&self, declared: &str) -> String {
        match &self.prefix {
            Some(prefix) => declared.strip_prefix(prefix.as_str()).unwrap_or(declared).to_string(),
            None => declared.to_string(),
        }
    }

    fn declare(
        &mut self,
        builder: PendingMethod,
        body: Unbound<H>,
    ) -> Result<MethodToken, RegistryError> {
        let registered = self.registered_name(&builder.name);
        if !is_identifier(&registered) {
            return Err(RegistryError::InvalidName(registered));
        }
        if self.methods.iter().any(|m| m.spec.name == registered) {
            return Err(RegistryError::NameCollision {
                scope: self.name.clone(),
                name: registered,
            });
        }
        let schema = Schema::synthesize(&builder.params, &self.chain.reserved_names())?;
        let execution = match body {
            Unbound::Blocking(_) => ExecutionModel::Blocking,
            Unbound::Suspending(_) => ExecutionModel::Suspending,
        };
        let spec = MethodSpec {
            name: registered.clone(),
            declared_name: builder.name,
            handler: self.name.clone(),
            params: builder.params,
            returns: builder.returns,
            description: builder.description,
            exposure: builder.exposure,
            execution,
            schema: Arc::new(schema),
        };
        let index = self.methods.len();
        self.methods.push(Declared {
            spec: Arc::new(spec),
            body,
        });
        Ok(MethodToken {
            index,
            name: registered,
        })
    }
}

struct PendingMethod {
    name: String,
    params: Vec<ParamSpec>,
    returns: Option<ParamKind>,
    description: Option<String>,
    exposure: Exposure,
}

/// Declares one method; finished by [`MethodBuilder::blocking`] or
/// [`MethodBuilder::suspending`].
pub struct MethodBuilder<'a, H> {
    api: &'a mut Api<H>,
    name: String,
    params: Vec<ParamSpec>,
    returns: Option<ParamKind>,
    description: Option<String>,
    exposure: Exposure,
}

impl<'a, H: Send + Sync + 'static> MethodBuilder<'a, H> {
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, kind: ParamKind) -> Self {
        self.returns = Some(kind);
        self
    }

    pub fn doc(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn exposure(mut self, exposure: Exposure) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn blocking<F>(self, f: F) -> Result<MethodToken, RegistryError>
    where
        F: Fn(&H, CallArgs) -> HandlerResult + Send + Sync + 'static,
    {
        let (api, pending) = self.split();
        api.declare(pending, Unbound::Blocking(Arc::new(f)))
    }

    pub fn suspending<F, Fut>(self, f: F) -> Result<MethodToken, RegistryError>
    where
        F: Fn(Arc<H>, CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let (api, pending) = self.split();
        let body: SuspendingMethod<H> = Arc::new(move |handler, args| f(handler, args).boxed());
        api.declare(pending, Unbound::Suspending(body))
    }

    fn split(self) -> (&'a mut Api<H>, PendingMethod) {
        (
            self.api,
            PendingMethod {
                name: self.name,
                params: self.params,
                returns: self.returns,
                description: self.description,
                exposure: self.exposure,
            },
        )
    }
}

/// A subtree of bound entries ready to mount.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub description: Option<String>,
    pub exposure: Exposure,
    pub entries: Vec<Arc<MethodEntry>>,
    pub children: Vec<Binding>,
}

impl Binding {
    /// A namespace with no methods of its own.
    pub fn group(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description,
            exposure: Exposure::ALL,
            entries: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: Binding) -> Self {
        self.children.push(child);
        self
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_exposure(mut self, exposure: Exposure) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn entry(&self, token: &MethodToken) -> Option<&Arc<MethodEntry>> {
        self.entries
            .get(token.index)
            .filter(|entry| entry.spec.name == token.name)
    }
}
