//! Hierarchical registry stored as an arena.
//!
//! Nodes and entries live in two vectors addressed by stable ids. A
//! node's parent link is an id used only for path reconstruction; it
//! never owns anything. Removed nodes are tombstoned so ids handed out
//! earlier never alias a different node.

use crate::api::Binding;
use crate::context::Channel;
use crate::describe::{ApiDocument, Description, MethodDescription};
use crate::entry::{Exposure, MethodEntry};
use crate::error::RegistryError;
use crate::schema::is_identifier;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type SharedRegistry = Arc<RwLock<RegistryTree>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

#[derive(Debug)]
struct Node {
    name: String,
    description: Option<String>,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
    entries: BTreeMap<String, EntryId>,
    exposure: Exposure,
}

impl Node {
    fn new(
        name: &str,
        description: Option<String>,
        parent: Option<NodeId>,
        exposure: Exposure,
    ) -> Self {
        Self {
            name: name.to_string(),
            description,
            parent,
            children: BTreeMap::new(),
            entries: BTreeMap::new(),
            exposure,
        }
    }

    fn holds(&self, name: &str) -> bool {
        self.children.contains_key(name) || self.entries.contains_key(name)
    }
}

/// A resolved method together with where it lives.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub path: String,
    pub node: NodeId,
    pub entry: Arc<MethodEntry>,
    /// Exposure after intersecting every enclosing namespace.
    pub exposure: Exposure,
}

/// Outcome of consuming CLI tokens against the tree.
#[derive(Debug, Clone)]
pub enum Target {
    Node(NodeId),
    Method(Resolved),
}

#[derive(Debug)]
pub struct RegistryTree {
    nodes: Vec<Option<Node>>,
    entries: Vec<Option<Arc<MethodEntry>>>,
}

impl Default for RegistryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node::new("", None, None, Exposure::ALL))],
            entries: Vec::new(),
        }
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn node(&self, id: NodeId) -> Result<&Node, RegistryError> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| RegistryError::NotFound(format!("node #{}", id.0)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, RegistryError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| RegistryError::NotFound(format!("node #{}", id.0)))
    }

    fn check_free(&self, parent: NodeId, name: &str) -> Result<(), RegistryError> {
        if !is_identifier(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.node(parent)?.holds(name) {
            return Err(RegistryError::NameCollision {
                scope: self.scope_label(parent),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn scope_label(&self, id: NodeId) -> String {
        let path = self.path_of(id);
        if path.is_empty() { "<root>".to_string() } else { path }
    }

    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: &str,
        description: Option<String>,
        exposure: Exposure,
    ) -> Result<NodeId, RegistryError> {
        self.check_free(parent, name)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(name, description, Some(parent), exposure)));
        self.node_mut(parent)?.children.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add one entry to `node`. A name already present in that node's own
    /// scope is rejected and the existing registration is kept.
    pub fn register(
        &mut self,
        node: NodeId,
        entry: Arc<MethodEntry>,
    ) -> Result<EntryId, RegistryError> {
        let name = entry.spec.name.clone();
        self.check_free(node, &name)?;
        let id = EntryId(self.entries.len());
        self.entries.push(Some(entry));
        self.node_mut(node)?.entries.insert(name, id);
        Ok(id)
    }

    /// Mount a bound subtree under `parent`. The whole binding is checked
    /// before anything is inserted, so a failed mount changes nothing.
    pub fn mount(&mut self, parent: NodeId, binding: &Binding) -> Result<NodeId, RegistryError> {
        self.check_free(parent, &binding.name)?;
        validate_binding(binding)?;
        self.insert_binding(parent, binding)
    }

    fn insert_binding(
        &mut self,
        parent: NodeId,
        binding: &Binding,
    ) -> Result<NodeId, RegistryError> {
        let id = self.add_child(
            parent,
            &binding.name,
            binding.description.clone(),
            binding.exposure,
        )?;
        for entry in &binding.entries {
            self.register(id, Arc::clone(entry))?;
        }
        for child in &binding.children {
            self.insert_binding(id, child)?;
        }
        Ok(id)
    }

    /// Remove the child namespace `name` of `parent` with everything in it.
    pub fn unmount(&mut self, parent: NodeId, name: &str) -> Result<(), RegistryError> {
        let id = self
            .node_mut(parent)?
            .children
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.tombstone(id);
        Ok(())
    }

    fn tombstone(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        for entry in node.entries.values() {
            if let Some(slot) = self.entries.get_mut(entry.0) {
                *slot = None;
            }
        }
        for child in node.children.values() {
            self.tombstone(*child);
        }
    }

    pub fn set_exposure(&mut self, node: NodeId, exposure: Exposure) -> Result<(), RegistryError> {
        self.node_mut(node)?.exposure = exposure;
        Ok(())
    }

    pub fn child(&self, node: NodeId, name: &str) -> Option<NodeId> {
        self.node(node).ok()?.children.get(name).copied()
    }

    pub fn children(&self, node: NodeId) -> Vec<(String, NodeId)> {
        self.node(node)
            .map(|n| n.children.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }

    pub fn entry(&self, id: EntryId) -> Option<&Arc<MethodEntry>> {
        self.entries.get(id.0).and_then(Option::as_ref)
    }

    pub fn entry_in(&self, node: NodeId, name: &str) -> Option<&Arc<MethodEntry>> {
        let id = *self.node(node).ok()?.entries.get(name)?;
        self.entry(id)
    }

    /// Number of live entries in the whole tree.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dotted path from the root; the root itself has an empty path.
    pub fn path_of(&self, node: NodeId) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let Ok(current) = self.node(id) else { break };
            if current.parent.is_some() {
                segments.push(current.name.as_str());
            }
            cursor = current.parent;
        }
        segments.reverse();
        segments.join(".")
    }

    /// Exposure of `node` after intersecting every ancestor.
    pub fn exposure_of(&self, node: NodeId) -> Exposure {
        let mut exposure = Exposure::ALL;
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let Ok(current) = self.node(id) else { break };
            exposure = exposure.intersect(current.exposure);
            cursor = current.parent;
        }
        exposure
    }

    fn resolved(&self, node: NodeId, entry: &Arc<MethodEntry>) -> Resolved {
        let prefix = self.path_of(node);
        let path = if prefix.is_empty() {
            entry.spec.name.clone()
        } else {
            format!("{prefix}.{}", entry.spec.name)
        };
        Resolved {
            path,
            node,
            entry: Arc::clone(entry),
            exposure: self.exposure_of(node).intersect(entry.spec.exposure),
        }
    }

    /// Resolve a `/` or `.` separated path: namespaces first, the final
    /// segment naming a method.
    pub fn resolve(&self, path: &str) -> Result<Resolved, RegistryError> {
        let segments: Vec<&str> = path.split(['/', '.']).filter(|s| !s.is_empty()).collect();
        let not_found = || RegistryError::NotFound(path.to_string());
        let (method, namespaces) = segments.split_last().ok_or_else(not_found)?;
        let mut node = self.root();
        for segment in namespaces {
            node = self.child(node, segment).ok_or_else(not_found)?;
        }
        let entry = self.entry_in(node, method).ok_or_else(not_found)?;
        Ok(self.resolved(node, entry))
    }

    /// Consume leading tokens naming namespaces, then at most one naming
    /// a method. Returns the target and how many tokens were consumed.
    pub fn resolve_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> (Target, usize) {
        let mut node = self.root();
        for (consumed, token) in tokens.iter().enumerate() {
            let token = token.as_ref();
            if let Some(child) = self.child(node, token) {
                node = child;
                continue;
            }
            if let Some(entry) = self.entry_in(node, token) {
                return (Target::Method(self.resolved(node, entry)), consumed + 1);
            }
            return (Target::Node(node), consumed);
        }
        (Target::Node(node), tokens.len())
    }

    /// Describe the subtree at `node`, keeping only what `channel` can see.
    pub fn describe_node(
        &self,
        node: NodeId,
        channel: Option<Channel>,
    ) -> Result<Description, RegistryError> {
        let current = self.node(node)?;
        let exposure = self.exposure_of(node);
        let visible = |e: Exposure| channel.is_none_or(|c| e.allows(c));
        let path = self.path_of(node);

        let methods = current
            .entries
            .values()
            .filter_map(|id| self.entry(*id))
            .map(|entry| self.resolved(node, entry))
            .filter(|r| visible(r.exposure))
            .map(|r| MethodDescription::from_spec(&r.entry.spec, &r.path, r.exposure))
            .collect();

        let mut children = Vec::new();
        for child in current.children.values() {
            if visible(exposure.intersect(self.node(*child)?.exposure)) {
                children.push(self.describe_node(*child, channel)?);
            }
        }

        Ok(Description {
            name: current.name.clone(),
            path,
            description: current.description.clone(),
            methods,
            children,
        })
    }

    pub fn describe(&self, channel: Option<Channel>) -> Result<ApiDocument, RegistryError> {
        Ok(ApiDocument::new(self.describe_node(self.root(), channel)?))
    }
}

fn validate_binding(binding: &Binding) -> Result<(), RegistryError> {
    let mut seen = std::collections::BTreeSet::new();
    let names = binding
        .entries
        .iter()
        .map(|e| e.spec.name.as_str())
        .chain(binding.children.iter().map(|c| c.name.as_str()));
    for name in names {
        if !is_identifier(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(RegistryError::NameCollision {
                scope: binding.name.clone(),
                name: name.to_string(),
            });
        }
    }
    binding.children.iter().try_for_each(validate_binding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Api;
    use crate::kind::ParamKind;
    use crate::schema::ParamSpec;
    use serde_json::json;

    struct Greeter;

    fn greeter(name: &str) -> Binding {
        let mut api = Api::<Greeter>::new(name);
        api.method("hello")
            .param(ParamSpec::new("who", ParamKind::Str))
            .blocking(|_: &Greeter, args| Ok(json!(format!("hello {}", args.str("who")?))))
            .expect("hello should declare");
        api.method("secret")
            .exposure(Exposure::CLI_ONLY)
            .blocking(|_: &Greeter, _| Ok(json!("s")))
            .expect("secret should declare");
        api.bind(Arc::new(Greeter))
    }

    #[test]
    fn mount_and_resolve_by_either_separator() {
        let mut tree = RegistryTree::new();
        tree.mount(tree.root(), &greeter("greet")).expect("mount should succeed");
        let slashed = tree.resolve("greet/hello").expect("slash path should resolve");
        let dotted = tree.resolve("greet.hello").expect("dot path should resolve");
        assert_eq!(slashed.path, "greet.hello");
        assert_eq!(dotted.path, "greet.hello");
        assert!(matches!(tree.resolve("greet.missing"), Err(RegistryError::NotFound(_))));
        assert!(matches!(tree.resolve("greet"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn colliding_mount_keeps_first_registration() {
        let mut tree = RegistryTree::new();
        let root = tree.root();
        tree.mount(root, &greeter("greet")).expect("first mount should succeed");
        let before = tree.len();
        let err = tree.mount(root, &greeter("greet")).expect_err("second mount should collide");
        assert!(matches!(err, RegistryError::NameCollision { .. }));
        assert_eq!(tree.len(), before);
        assert!(tree.resolve("greet.hello").is_ok());
    }

    #[test]
    fn parent_and_child_scopes_are_independent() {
        let mut tree = RegistryTree::new();
        let root = tree.root();
        let outer = tree.mount(root, &greeter("outer")).expect("outer should mount");
        tree.mount(outer, &greeter("hello_ns")).expect("nested should mount");
        assert!(tree.resolve("outer.hello").is_ok());
        assert!(tree.resolve("outer.hello_ns.hello").is_ok());
    }

    #[test]
    fn unmount_tombstones_the_subtree() {
        let mut tree = RegistryTree::new();
        let root = tree.root();
        tree.mount(root, &greeter("greet")).expect("mount should succeed");
        tree.unmount(root, "greet").expect("unmount should succeed");
        assert!(tree.is_empty());
        assert!(tree.resolve("greet.hello").is_err());
        tree.mount(root, &greeter("greet")).expect("remount should succeed");
    }

    #[test]
    fn tokens_consume_namespaces_then_method() {
        let mut tree = RegistryTree::new();
        tree.mount(tree.root(), &greeter("greet")).expect("mount should succeed");
        let (target, consumed) = tree.resolve_tokens(&["greet", "hello", "bob"]);
        assert_eq!(consumed, 2);
        assert!(matches!(target, Target::Method(ref r) if r.path == "greet.hello"));
        let (target, consumed) = tree.resolve_tokens(&["greet", "--help"]);
        assert_eq!(consumed, 1);
        assert!(matches!(target, Target::Node(_)));
    }

    #[test]
    fn description_filters_by_channel() {
        let mut tree = RegistryTree::new();
        tree.mount(tree.root(), &greeter("greet")).expect("mount should succeed");
        let network = tree.describe(Some(Channel::Network)).expect("describe should succeed");
        let greet = network.root.child("greet").expect("greet should be described");
        assert!(greet.method("hello").is_some());
        assert!(greet.method("secret").is_none());

        let cli = tree.describe(Some(Channel::Cli)).expect("describe should succeed");
        assert!(cli.root.find("greet").and_then(|g| g.method("secret")).is_some());
    }
}
