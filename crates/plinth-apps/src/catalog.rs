//! Compiled-in handler types that applications can instantiate.

use crate::error::LoadError;
use plinth_kernel::{
    Api, Binding, CallArgs, Description, HandlerError, ParamSpec, RawArgs, RegistryError, Schema,
    SchemaError,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Builds live handlers of one type from constructor arguments.
pub trait HandlerFactory: Send + Sync {
    fn type_name(&self) -> &str;

    fn constructor(&self) -> &Schema;

    /// Full surface of the type, available without an instance.
    fn describe(&self) -> Description;

    fn instantiate(&self, args: CallArgs) -> Result<Binding, HandlerError>;
}

type Builder<H> = Box<dyn Fn(&Api<H>, CallArgs) -> Result<Binding, HandlerError> + Send + Sync>;

/// A factory backed by an [`Api`] declaration.
pub struct ApiFactory<H> {
    api: Api<H>,
    constructor: Schema,
    children: Vec<Description>,
    build: Builder<H>,
}

impl<H: Send + Sync + 'static> ApiFactory<H> {
    /// Construct `H` from its arguments and bind the whole api to it.
    pub fn new<F>(api: Api<H>, construct: F) -> Self
    where
        F: Fn(&CallArgs) -> Result<H, HandlerError> + Send + Sync + 'static,
    {
        Self {
            api,
            constructor: Schema::default(),
            children: Vec::new(),
            build: Box::new(move |api: &Api<H>, args: CallArgs| {
                Ok(api.bind(Arc::new(construct(&args)?)))
            }),
        }
    }

    /// Full control over the binding, for types that mount child handlers.
    pub fn with_builder<F>(api: Api<H>, build: F) -> Self
    where
        F: Fn(&Api<H>, CallArgs) -> Result<Binding, HandlerError> + Send + Sync + 'static,
    {
        Self {
            api,
            constructor: Schema::default(),
            children: Vec::new(),
            build: Box::new(build),
        }
    }

    pub fn with_constructor(mut self, params: &[ParamSpec]) -> Result<Self, SchemaError> {
        self.constructor = Schema::synthesize(params, &BTreeSet::new())?;
        Ok(self)
    }

    /// Record the surface of a child handler the builder mounts.
    pub fn describe_child<C: Send + Sync + 'static>(mut self, name: &str, child: &Api<C>) -> Self {
        let mut description = child.describe_type();
        let base = format!("{}.{name}", self.api.name());
        for method in &mut description.methods {
            method.path = format!("{base}.{}", method.name);
        }
        description.name = name.to_string();
        description.path = base;
        self.children.push(description);
        self
    }
}

impl<H: Send + Sync + 'static> HandlerFactory for ApiFactory<H> {
    fn type_name(&self) -> &str {
        self.api.name()
    }

    fn constructor(&self) -> &Schema {
        &self.constructor
    }

    fn describe(&self) -> Description {
        let mut description = self.api.describe_type();
        description.children = self.children.clone();
        description
    }

    fn instantiate(&self, args: CallArgs) -> Result<Binding, HandlerError> {
        (self.build)(&self.api, args)
    }
}

/// Registry of factories keyed by type name.
#[derive(Default, Clone)]
pub struct HandlerCatalog {
    factories: BTreeMap<String, Arc<dyn HandlerFactory>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        factory: impl HandlerFactory + 'static,
    ) -> Result<(), RegistryError> {
        let name = factory.type_name().to_string();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::NameCollision {
                scope: "catalog".to_string(),
                name,
            });
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn HandlerFactory>> {
        self.factories.get(type_name).cloned()
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn describe(&self, type_name: &str) -> Result<Description, LoadError> {
        self.get(type_name)
            .map(|factory| factory.describe())
            .ok_or_else(|| LoadError::UnknownType(type_name.to_string()))
    }

    /// Validate constructor arguments and build a binding.
    pub fn instantiate(
        &self,
        type_name: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<Binding, LoadError> {
        let factory = self
            .get(type_name)
            .ok_or_else(|| LoadError::UnknownType(type_name.to_string()))?;
        let raw = RawArgs {
            positional: args.to_vec(),
            named: kwargs.clone(),
        };
        let fail = |message: String| LoadError::Instantiate {
            type_name: type_name.to_string(),
            message,
        };
        let call_args = factory
            .constructor()
            .validate(&raw, &BTreeSet::new())
            .map_err(|err| fail(err.to_string()))?;
        factory.instantiate(call_args).map_err(|err| fail(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_kernel::ParamKind;
    use serde_json::json;

    struct Counter {
        start: i64,
    }

    fn counter_factory() -> ApiFactory<Counter> {
        let mut api = Api::<Counter>::new("Counter");
        api.method("start")
            .blocking(|counter: &Counter, _| Ok(json!(counter.start)))
            .expect("start should declare");
        ApiFactory::new(api, |args| Ok(Counter { start: args.int("start")? }))
            .with_constructor(&[ParamSpec::new("start", ParamKind::Int).with_default(0)])
            .expect("constructor should synthesize")
    }

    #[test]
    fn describe_needs_no_instance() {
        let mut catalog = HandlerCatalog::new();
        catalog.register(counter_factory()).expect("register should succeed");
        let description = catalog.describe("Counter").expect("type should be known");
        assert_eq!(description.methods[0].name, "start");
        assert!(matches!(catalog.describe("Missing"), Err(LoadError::UnknownType(_))));
    }

    #[test]
    fn constructor_arguments_are_validated() {
        let mut catalog = HandlerCatalog::new();
        catalog.register(counter_factory()).expect("register should succeed");
        let binding = catalog
            .instantiate("Counter", &[json!("5")], &BTreeMap::new())
            .expect("instantiate should succeed");
        assert_eq!(binding.entries.len(), 1);

        let err = catalog
            .instantiate("Counter", &[json!("five")], &BTreeMap::new())
            .expect_err("start is not an int");
        assert!(matches!(err, LoadError::Instantiate { .. }));
    }

    #[test]
    fn duplicate_type_names_collide() {
        let mut catalog = HandlerCatalog::new();
        catalog.register(counter_factory()).expect("first register should succeed");
        assert!(catalog.register(counter_factory()).is_err());
    }
}
