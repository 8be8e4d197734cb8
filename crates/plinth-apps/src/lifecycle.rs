//! Application lifecycle: spec-only → loaded → unloaded.

use crate::catalog::HandlerCatalog;
use crate::error::{AppError, LoadError};
use crate::source::SourceUnit;
use crate::spec::ApplicationSpec;
use crate::state::ApplicationState;
use crate::store::{read_state, write_state};
use plinth_kernel::{NodeId, RegistryTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppStatus {
    /// Persisted but not instantiated.
    SpecOnly,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedApp {
    pub node: NodeId,
    pub module: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppListing {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub status: AppStatus,
    pub cli_enabled: bool,
    pub network_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<String>,
}

/// The set of known applications, optionally backed by a registry file.
#[derive(Debug, Default)]
pub struct AppRegistry {
    path: Option<PathBuf>,
    autosave: bool,
    specs: Vec<ApplicationSpec>,
    loaded: BTreeMap<String, LoadedApp>,
}

impl AppRegistry {
    /// Registry kept only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the registry file at `path`; a missing file is an empty registry.
    pub fn open(path: impl Into<PathBuf>, autosave: bool) -> Result<Self, AppError> {
        let path = path.into();
        let specs = read_state(&path)?.map(|state| state.apps).unwrap_or_default();
        debug!(path = %path.display(), apps = specs.len(), "opened application registry");
        Ok(Self {
            path: Some(path),
            autosave,
            specs,
            loaded: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the registry file, if there is one.
    pub fn flush(&self) -> Result<(), AppError> {
        self.write_specs(&self.specs)
    }

    fn write_specs(&self, specs: &[ApplicationSpec]) -> Result<(), AppError> {
        if let Some(path) = &self.path {
            write_state(path, &ApplicationState::new(specs.to_vec()))?;
        }
        Ok(())
    }

    /// Persist `candidate` when autosaving, then make it the in-memory
    /// spec list. A failed write leaves memory untouched.
    fn commit_specs(&mut self, candidate: Vec<ApplicationSpec>) -> Result<(), AppError> {
        if self.autosave {
            self.write_specs(&candidate)?;
        }
        self.specs = candidate;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ApplicationSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn specs(&self) -> &[ApplicationSpec] {
        &self.specs
    }

    pub fn status(&self, name: &str) -> Option<AppStatus> {
        self.get(name).map(|_| {
            if self.loaded.contains_key(name) {
                AppStatus::Loaded
            } else {
                AppStatus::SpecOnly
            }
        })
    }

    pub fn loaded(&self, name: &str) -> Option<&LoadedApp> {
        self.loaded.get(name)
    }

    pub fn list(&self) -> Vec<AppListing> {
        self.specs
            .iter()
            .map(|spec| AppListing {
                name: spec.name.clone(),
                path: spec.path.clone(),
                type_name: spec.type_name.clone(),
                status: self.status(&spec.name).unwrap_or(AppStatus::SpecOnly),
                cli_enabled: spec.cli_enabled,
                network_enabled: spec.network_enabled,
            })
            .collect()
    }

    /// Record a new spec. The source unit must resolve and export the
    /// requested type; its module id is recorded on the spec.
    pub fn add(&mut self, mut spec: ApplicationSpec) -> Result<&ApplicationSpec, AppError> {
        spec.validate()?;
        if self.get(&spec.name).is_some() {
            return Err(AppError::NameCollision(spec.name));
        }
        let source = Path::new(&spec.path);
        let unit = SourceUnit::resolve(&spec.name, source)?;
        unit.select(source, spec.type_name.as_deref())?;
        if let Ok(absolute) = std::path::absolute(source) {
            spec.path = absolute.display().to_string();
        }
        spec.module = Some(unit.module);
        let mut candidate = self.specs.clone();
        candidate.push(spec);
        self.commit_specs(candidate)?;
        let added = &self.specs[self.specs.len() - 1];
        info!(app = %added.name, path = %added.path, "application added");
        Ok(added)
    }

    /// Unload if loaded, then forget the spec. When the registry file
    /// cannot be written the spec is kept, unloaded.
    pub fn remove(
        &mut self,
        name: &str,
        tree: &mut RegistryTree,
    ) -> Result<ApplicationSpec, AppError> {
        let index = self
            .specs
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| AppError::NotFound(name.to_string()))?;
        self.unload(name, tree)?;
        let mut candidate = self.specs.clone();
        let spec = candidate.remove(index);
        self.commit_specs(candidate)?;
        info!(app = %name, "application removed");
        Ok(spec)
    }

    /// Instantiate the application and mount it under the tree root.
    /// Loading an already loaded application returns its node.
    pub fn load(
        &mut self,
        name: &str,
        catalog: &HandlerCatalog,
        tree: &mut RegistryTree,
    ) -> Result<NodeId, AppError> {
        if let Some(loaded) = self.loaded.get(name) {
            return Ok(loaded.node);
        }
        let spec = self
            .get(name)
            .ok_or_else(|| AppError::NotFound(name.to_string()))?
            .clone();
        let source = Path::new(&spec.path);
        let unit = SourceUnit::resolve(name, source)?;
        let type_name = unit.select(source, spec.type_name.as_deref())?;
        let binding = catalog
            .instantiate(&type_name, &spec.args, &spec.kwargs)?
            .renamed(name)
            .with_exposure(spec.exposure());
        let root = tree.root();
        let node = tree.mount(root, &binding).map_err(LoadError::from)?;
        info!(app = %name, type_name = %type_name, "application loaded");
        self.loaded.insert(
            name.to_string(),
            LoadedApp {
                node,
                module: unit.module,
                type_name,
            },
        );
        Ok(node)
    }

    /// Drop the live subtree but keep the spec. Returns whether anything
    /// was loaded.
    pub fn unload(&mut self, name: &str, tree: &mut RegistryTree) -> Result<bool, AppError> {
        if self.get(name).is_none() {
            return Err(AppError::NotFound(name.to_string()));
        }
        if self.loaded.remove(name).is_none() {
            return Ok(false);
        }
        let root = tree.root();
        tree.unmount(root, name).map_err(LoadError::from)?;
        info!(app = %name, "application unloaded");
        Ok(true)
    }

    /// Write every current spec to `path`.
    pub fn save_state(&self, path: &Path) -> Result<ApplicationState, AppError> {
        let state = ApplicationState::new(self.specs.clone());
        write_state(path, &state)?;
        info!(path = %path.display(), apps = state.apps.len(), "state saved");
        Ok(state)
    }

    /// Replay add and load for every spec in the snapshot at `path`.
    ///
    /// With `skip_missing`, a spec whose source no longer resolves is
    /// logged and skipped. Otherwise the first such spec aborts the
    /// restore; applications loaded before it stay loaded.
    pub fn load_state(
        &mut self,
        path: &Path,
        skip_missing: bool,
        catalog: &HandlerCatalog,
        tree: &mut RegistryTree,
    ) -> Result<RestoreReport, AppError> {
        let state =
            read_state(path)?.ok_or_else(|| AppError::NotFound(path.display().to_string()))?;
        let mut report = RestoreReport::default();
        for spec in state.apps {
            if skip_missing && !Path::new(&spec.path).exists() {
                warn!(app = %spec.name, path = %spec.path, "source missing, skipping");
                report.skipped.push(spec.name);
                continue;
            }
            match self.get(&spec.name) {
                Some(existing) if *existing == spec => {}
                Some(_) => return Err(AppError::NameCollision(spec.name)),
                None => {
                    self.add(spec.clone())?;
                }
            }
            self.load(&spec.name, catalog, tree)?;
            report.loaded.push(spec.name);
        }
        info!(
            path = %path.display(),
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "state restored"
        );
        Ok(report)
    }
}
