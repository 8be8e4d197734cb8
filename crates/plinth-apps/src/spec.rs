//! Persisted application records.

use crate::error::AppError;
use plinth_kernel::Exposure;
use plinth_kernel::schema::is_identifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

fn enabled() -> bool {
    true
}

/// One named, loadable application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub name: String,
    /// Path to the single source unit.
    pub path: String,
    /// Module id declared by the source unit, recorded at add time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Target type; the unit's default type when absent.
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,
    #[serde(default = "enabled")]
    pub cli_enabled: bool,
    #[serde(default = "enabled")]
    pub network_enabled: bool,
}

impl ApplicationSpec {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            module: None,
            type_name: None,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            cli_enabled: true,
            network_enabled: true,
        }
    }

    /// Build a spec from a `path[:TypeName]` target.
    pub fn from_target(name: impl Into<String>, target: &str) -> Self {
        let (path, type_name) = parse_target(target);
        Self {
            type_name,
            ..Self::new(name, path)
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn with_exposure(mut self, exposure: Exposure) -> Self {
        self.cli_enabled = exposure.cli;
        self.network_enabled = exposure.network;
        self
    }

    pub fn exposure(&self) -> Exposure {
        Exposure {
            cli: self.cli_enabled,
            network: self.network_enabled,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !is_identifier(&self.name) || self.name.starts_with('_') {
            return Err(AppError::InvalidSpec(format!(
                "application name `{}` must be an identifier not starting with `_`",
                self.name
            )));
        }
        if self.path.trim().is_empty() {
            return Err(AppError::InvalidSpec(format!("application `{}` has no path", self.name)));
        }
        if let Some(type_name) = &self.type_name
            && !is_identifier(type_name)
        {
            return Err(AppError::InvalidSpec(format!("invalid type name `{type_name}`")));
        }
        Ok(())
    }
}

/// Split `path[:TypeName]`. A suffix that is not an identifier (for
/// example a drive letter) stays part of the path.
pub fn parse_target(target: &str) -> (String, Option<String>) {
    match target.rsplit_once(':') {
        Some((path, type_name))
            if !path.is_empty() && is_identifier(type_name) && !type_name.contains('-') =>
        {
            (path.to_string(), Some(type_name.to_string()))
        }
        _ => (target.to_string(), None),
    }
}
