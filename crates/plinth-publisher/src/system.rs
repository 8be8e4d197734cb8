//! The `_system` handler: introspection commands mounted on the root.
//!
//! Names starting with `_` are left out of handler listings and help, but
//! stay callable on every channel.

use parking_lot::RwLock;
use plinth_kernel::{
    Api, Binding, HandlerError, ParamKind, ParamSpec, RegistryError, RegistryTree, SharedRegistry,
};
use serde_json::{Value, json};
use std::sync::{Arc, Weak};

pub const SYSTEM_HANDLER: &str = "_system";

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('_')
}

/// Holds the tree weakly; the tree owns this handler's entries.
pub struct SystemCommands {
    tree: Weak<RwLock<RegistryTree>>,
}

impl SystemCommands {
    fn tree(&self) -> Result<SharedRegistry, HandlerError> {
        self.tree
            .upgrade()
            .ok_or_else(|| HandlerError::new("registry tree has been dropped"))
    }

    fn list_handlers(&self) -> Result<Value, HandlerError> {
        let tree = self.tree()?;
        let tree = tree.read();
        let root = tree
            .describe_node(tree.root(), None)
            .map_err(|e| HandlerError::new(e.to_string()))?;
        let handlers: Vec<Value> = root
            .children
            .iter()
            .filter(|child| !is_hidden(&child.name))
            .map(|child| {
                json!({
                    "name": child.name,
                    "description": child.description,
                    "methods": child.all_methods().len(),
                })
            })
            .collect();
        Ok(Value::Array(handlers))
    }

    fn get_handler_info(&self, name: &str) -> Result<Value, HandlerError> {
        let tree = self.tree()?;
        let tree = tree.read();
        let node = tree
            .child(tree.root(), name)
            .ok_or_else(|| {
                HandlerError::new(format!("unknown handler: {name}"))
                    .with_detail(json!({ "handler": name }))
            })?;
        let description = tree
            .describe_node(node, None)
            .map_err(|e| HandlerError::new(e.to_string()))?;
        Ok(serde_json::to_value(description)?)
    }

    fn get_api_tree(&self) -> Result<Value, HandlerError> {
        let tree = self.tree()?;
        let mut document = tree
            .read()
            .describe(None)
            .map_err(|e| HandlerError::new(e.to_string()))?;
        document.root.children.retain(|child| !is_hidden(&child.name));
        Ok(serde_json::to_value(document)?)
    }
}

pub fn system_api() -> Result<Api<SystemCommands>, RegistryError> {
    let mut api = Api::new(SYSTEM_HANDLER).describe("Registry introspection");
    api.method("list_handlers")
        .doc("List mounted handlers")
        .returns(ParamKind::Json)
        .blocking(|system: &SystemCommands, _| system.list_handlers())?;
    api.method("get_handler_info")
        .doc("Describe one handler and everything under it")
        .param(ParamSpec::new("name", ParamKind::Str))
        .returns(ParamKind::Json)
        .blocking(|system: &SystemCommands, args| system.get_handler_info(args.str("name")?))?;
    api.method("get_api_tree")
        .doc("Describe every handler")
        .returns(ParamKind::Json)
        .blocking(|system: &SystemCommands, _| system.get_api_tree())?;
    Ok(api)
}

/// Bind the system commands to `tree`, ready to mount at its root.
pub fn system_binding(tree: &SharedRegistry) -> Result<Binding, RegistryError> {
    Ok(system_api()?.bind(Arc::new(SystemCommands {
        tree: Arc::downgrade(tree),
    })))
}
