//! The publisher: one registry tree, one application registry, and the
//! channel adapters over them.

use crate::config::PublisherConfig;
use crate::error::PublishError;
use crate::format::{render_help, render_method_help};
use crate::system::{is_hidden, system_binding};
use parking_lot::Mutex;
use plinth_apps::{
    AppError, AppListing, AppRegistry, ApplicationSpec, ApplicationState, HandlerCatalog,
    RestoreReport, SourceUnit,
};
use plinth_http::{HttpServeError, HttpServerConfig, NetworkChannel};
use plinth_kernel::{
    ApiDocument, Channel, Description, DispatchError, Dispatcher, Exposure, MethodDescription,
    NodeId, RegistryTree, SharedRegistry, Target,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const PROGRAM: &str = "plinth";

/// What a CLI invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CliOutput {
    Value(Value),
    Help(String),
}

pub struct Publisher {
    config: PublisherConfig,
    tree: SharedRegistry,
    apps: Mutex<AppRegistry>,
    catalog: HandlerCatalog,
    dispatcher: Dispatcher,
}

impl Publisher {
    /// Open the registry file named by `config`.
    pub fn open(config: PublisherConfig, catalog: HandlerCatalog) -> Result<Self, PublishError> {
        let apps = AppRegistry::open(&config.registry, config.autosave)?;
        Self::with_apps(config, catalog, apps)
    }

    /// A publisher whose application registry is never written to disk.
    pub fn in_memory(
        config: PublisherConfig,
        catalog: HandlerCatalog,
    ) -> Result<Self, PublishError> {
        Self::with_apps(config, catalog, AppRegistry::in_memory())
    }

    fn with_apps(
        config: PublisherConfig,
        catalog: HandlerCatalog,
        apps: AppRegistry,
    ) -> Result<Self, PublishError> {
        let tree = RegistryTree::shared();
        let system = system_binding(&tree)?;
        {
            let mut guard = tree.write();
            let root = guard.root();
            guard.mount(root, &system)?;
        }
        let dispatcher = Dispatcher::new(Arc::clone(&tree));
        Ok(Self {
            config,
            tree,
            apps: Mutex::new(apps),
            catalog,
            dispatcher,
        })
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn tree(&self) -> &SharedRegistry {
        &self.tree
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn catalog(&self) -> &HandlerCatalog {
        &self.catalog
    }

    pub fn add(&self, spec: ApplicationSpec) -> Result<ApplicationSpec, PublishError> {
        Ok(self.apps.lock().add(spec)?.clone())
    }

    pub fn remove(&self, name: &str) -> Result<ApplicationSpec, PublishError> {
        let mut apps = self.apps.lock();
        let mut tree = self.tree.write();
        Ok(apps.remove(name, &mut tree)?)
    }

    pub fn list(&self) -> Vec<AppListing> {
        self.apps.lock().list()
    }

    pub fn get(&self, name: &str) -> Result<AppListing, PublishError> {
        self.list()
            .into_iter()
            .find(|listing| listing.name == name)
            .ok_or_else(|| AppError::NotFound(name.to_string()).into())
    }

    pub fn load(&self, name: &str) -> Result<NodeId, PublishError> {
        let mut apps = self.apps.lock();
        let mut tree = self.tree.write();
        Ok(apps.load(name, &self.catalog, &mut tree)?)
    }

    pub fn unload(&self, name: &str) -> Result<bool, PublishError> {
        let mut apps = self.apps.lock();
        let mut tree = self.tree.write();
        Ok(apps.unload(name, &mut tree)?)
    }

    /// Load every application enabled on `channel`.
    pub fn load_all(&self, channel: Channel) -> Result<Vec<String>, PublishError> {
        let mut apps = self.apps.lock();
        let names: Vec<String> = apps
            .specs()
            .iter()
            .filter(|spec| spec.exposure().allows(channel))
            .map(|spec| spec.name.clone())
            .collect();
        let mut tree = self.tree.write();
        for name in &names {
            apps.load(name, &self.catalog, &mut tree)?;
        }
        debug!(%channel, apps = names.len(), "applications loaded");
        Ok(names)
    }

    fn ensure_loaded(&self, name: &str, channel: Channel) -> Result<(), PublishError> {
        let mut apps = self.apps.lock();
        let exposure = apps
            .get(name)
            .map(ApplicationSpec::exposure)
            .ok_or_else(|| DispatchError::NotFound(name.to_string()))?;
        if !exposure.allows(channel) {
            return Err(DispatchError::NotFound(name.to_string()).into());
        }
        let mut tree = self.tree.write();
        apps.load(name, &self.catalog, &mut tree)?;
        Ok(())
    }

    pub fn save_state(
        &self,
        path: Option<&Path>,
    ) -> Result<(PathBuf, ApplicationState), PublishError> {
        let path = path.map_or_else(|| self.config.state.clone(), Path::to_path_buf);
        let state = self.apps.lock().save_state(&path)?;
        Ok((path, state))
    }

    pub fn load_state(
        &self,
        path: Option<&Path>,
        skip_missing: bool,
    ) -> Result<RestoreReport, PublishError> {
        let path = path.map_or_else(|| self.config.state.clone(), Path::to_path_buf);
        let mut apps = self.apps.lock();
        let mut tree = self.tree.write();
        Ok(apps.load_state(&path, skip_missing, &self.catalog, &mut tree)?)
    }

    /// Describe one application, or all of them, from the catalog alone.
    /// Nothing is instantiated.
    pub fn describe(&self, app: Option<&str>) -> Result<ApiDocument, PublishError> {
        let apps = self.apps.lock();
        let specs: Vec<&ApplicationSpec> = match app {
            Some(name) => vec![apps.get(name).ok_or_else(|| AppError::NotFound(name.to_string()))?],
            None => apps.specs().iter().collect(),
        };
        let mut children = Vec::with_capacity(specs.len());
        for spec in specs {
            children.push(self.describe_spec(spec)?);
        }
        Ok(ApiDocument::new(Description {
            name: String::new(),
            path: String::new(),
            description: None,
            methods: Vec::new(),
            children,
        }))
    }

    fn describe_spec(&self, spec: &ApplicationSpec) -> Result<Description, PublishError> {
        let source = Path::new(&spec.path);
        let unit = SourceUnit::resolve(&spec.name, source).map_err(AppError::from)?;
        let type_name = unit.select(source, spec.type_name.as_deref()).map_err(AppError::from)?;
        let mut description = self.catalog.describe(&type_name).map_err(AppError::from)?;
        rebase(&mut description, &spec.name, &spec.name, spec.exposure());
        Ok(description)
    }

    /// The CLI channel: `<app> [handler...] <method> [args...]`.
    ///
    /// A bare namespace, or any `--help` / `-h` before `--`, renders help
    /// instead of calling.
    pub fn run_cli<S: AsRef<str>>(&self, tokens: &[S]) -> Result<CliOutput, PublishError> {
        let app = tokens
            .first()
            .map(AsRef::as_ref)
            .ok_or_else(|| {
                PublishError::Usage("expected <app> [handler...] <method> [args...]".to_string())
            })?;
        if is_hidden(app) {
            self.load_all(Channel::Cli)?;
        } else {
            self.ensure_loaded(app, Channel::Cli)?;
        }
        let wants_help = tokens
            .iter()
            .map(AsRef::as_ref)
            .take_while(|t| *t != "--")
            .any(|t| t == "--help" || t == "-h");

        let (target, consumed) = self.tree.read().resolve_tokens(tokens);
        match target {
            Target::Node(node) if wants_help || consumed == tokens.len() => {
                let description = self.tree.read().describe_node(node, Some(Channel::Cli))?;
                Ok(CliOutput::Help(render_help(PROGRAM, &description)))
            }
            Target::Method(resolved) if wants_help && resolved.exposure.allows(Channel::Cli) => {
                let method = MethodDescription::from_spec(
                    &resolved.entry.spec,
                    &resolved.path,
                    resolved.exposure,
                );
                Ok(CliOutput::Help(render_method_help(PROGRAM, &method)))
            }
            _ => Ok(CliOutput::Value(self.dispatcher.call_cli(tokens)?)),
        }
    }

    /// Load every network-enabled application and build the network
    /// channel over the resulting tree.
    pub fn network_channel(&self) -> Result<NetworkChannel, PublishError> {
        self.load_all(Channel::Network)?;
        Ok(NetworkChannel::with_title(
            self.dispatcher.clone(),
            PROGRAM,
            env!("CARGO_PKG_VERSION"),
        )?)
    }

    /// Serve the network channel on a multi-threaded runtime until
    /// interrupted.
    pub fn serve(&self, bind: Option<SocketAddr>) -> Result<(), PublishError> {
        let bind = bind.unwrap_or(self.config.bind);
        let channel = Arc::new(self.network_channel()?);
        info!(%bind, handlers = ?channel.handlers(), "starting network channel");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(HttpServeError::Runtime)?;
        runtime.block_on(plinth_http::serve(HttpServerConfig { bind }, channel))?;
        Ok(())
    }
}

/// Re-root a type description under an application name.
fn rebase(description: &mut Description, name: &str, path: &str, exposure: Exposure) {
    description.name = name.to_string();
    description.path = path.to_string();
    for method in &mut description.methods {
        method.path = format!("{path}.{}", method.name);
        method.exposure = method.exposure.intersect(exposure);
    }
    for child in &mut description.children {
        let child_name = child.name.clone();
        rebase(child, &child_name, &format!("{path}.{child_name}"), exposure);
    }
}
