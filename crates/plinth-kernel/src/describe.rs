//! Machine-readable description of a registry tree.
//!
//! Both channels render from this one document: the CLI for help tables,
//! the network channel for its startup API description.

use crate::entry::{ExecutionModel, Exposure, MethodSpec};
use crate::kind::ParamKind;
use crate::schema::FieldSchema;
use serde::{Deserialize, Serialize};

pub const API_DOCUMENT_KIND: &str = "plinth.api_description.v1";
pub const API_DOCUMENT_SCHEMA: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescription {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Vec<FieldSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<ParamKind>,
    pub execution: ExecutionModel,
    pub exposure: Exposure,
}

impl MethodDescription {
    pub fn from_spec(spec: &MethodSpec, path: &str, exposure: Exposure) -> Self {
        Self {
            name: spec.name.clone(),
            path: path.to_string(),
            description: spec.description.clone(),
            parameters: spec.schema.fields.clone(),
            returns: spec.returns.clone(),
            execution: spec.execution,
            exposure,
        }
    }
}

/// One namespace node with its methods and nested namespaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Description {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub methods: Vec<MethodDescription>,
    pub children: Vec<Description>,
}

impl Description {
    pub fn child(&self, name: &str) -> Option<&Description> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescription> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Look up a nested namespace by dotted or slashed path.
    pub fn find(&self, path: &str) -> Option<&Description> {
        path.split(['.', '/'])
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Every method in the subtree, depth first.
    pub fn all_methods(&self) -> Vec<&MethodDescription> {
        let mut out: Vec<&MethodDescription> = self.methods.iter().collect();
        for child in &self.children {
            out.extend(child.all_methods());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDocument {
    pub schema: u32,
    pub document_kind: String,
    pub root: Description,
}

impl ApiDocument {
    pub fn new(root: Description) -> Self {
        Self {
            schema: API_DOCUMENT_SCHEMA,
            document_kind: API_DOCUMENT_KIND.to_string(),
            root,
        }
    }
}
