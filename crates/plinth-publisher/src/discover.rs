//! Find which registry holds an application: the project one first, then
//! the per-user one.

use crate::error::PublishError;
use plinth_apps::{AppError, AppRegistry};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryScope {
    Local,
    Global,
}

/// Where [`discover_app`] found an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub scope: RegistryScope,
    pub registry: PathBuf,
}

fn holds(path: &Path, name: &str) -> Result<bool, PublishError> {
    Ok(AppRegistry::open(path, false)?.get(name).is_some())
}

/// Look `name` up in `local`, then in `global`. Neither registry is
/// written. Missing in both is `AppError::NotFound`.
pub fn discover_app(
    name: &str,
    local: &Path,
    global: Option<&Path>,
) -> Result<Discovered, PublishError> {
    if holds(local, name)? {
        return Ok(Discovered {
            scope: RegistryScope::Local,
            registry: local.to_path_buf(),
        });
    }
    if let Some(global) = global.filter(|global| *global != local)
        && holds(global, name)?
    {
        debug!(app = %name, registry = %global.display(), "found in global registry");
        return Ok(Discovered {
            scope: RegistryScope::Global,
            registry: global.to_path_buf(),
        });
    }
    Err(AppError::NotFound(format!("{name} (not in local or global registry)")).into())
}
