//! Layered publisher configuration.
//!
//! # Load Order
//!
//! 1. Defaults
//! 2. Global config (`~/.plinth/config.toml`)
//! 3. Project config (`.plinth/config.toml`)
//! 4. Environment variables (`PLINTH_*`)
//!
//! Each layer overrides the previous. Command-line overrides are applied
//! by the caller on the loaded value. Relative paths resolve against the
//! project root.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_DIR: &str = ".plinth";
pub const CONFIG_FILE: &str = "config.toml";
pub const REGISTRY_FILE: &str = "registry.json";
pub const STATE_FILE: &str = "state.json";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },

    #[error("invalid bind address '{0}'")]
    InvalidBind(String),

    #[error("home directory could not be determined")]
    NoHome,
}

/// Resolved settings for one publisher process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublisherConfig {
    /// Registry file holding the added application specs.
    pub registry: PathBuf,
    /// Default snapshot path for `savestate` and `loadstate`.
    pub state: PathBuf,
    pub bind: SocketAddr,
    /// Log filter directive, e.g. `debug` or `plinth_kernel=trace`.
    pub log: Option<String>,
    /// Write the registry file after every add or remove.
    pub autosave: bool,
}

impl PublisherConfig {
    /// Defaults rooted at `project_root`.
    pub fn defaults(project_root: &Path) -> Self {
        let dir = project_root.join(CONFIG_DIR);
        Self {
            registry: dir.join(REGISTRY_FILE),
            state: dir.join(STATE_FILE),
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            log: None,
            autosave: true,
        }
    }

    fn apply(&mut self, layer: ConfigLayer, root: &Path) -> Result<(), ConfigError> {
        if let Some(registry) = layer.registry {
            self.registry = root.join(registry);
        }
        if let Some(state) = layer.state {
            self.state = root.join(state);
        }
        if let Some(bind) = layer.bind {
            self.bind = parse_bind(&bind)?;
        }
        if layer.log.is_some() {
            self.log = layer.log;
        }
        if let Some(autosave) = layer.autosave {
            self.autosave = autosave;
        }
        Ok(())
    }
}

/// One config file, every key optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigLayer {
    registry: Option<PathBuf>,
    state: Option<PathBuf>,
    bind: Option<String>,
    log: Option<String>,
    autosave: Option<bool>,
}

pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR))
}

/// Registry file shared by every project of the current user.
pub fn global_registry_path() -> Result<PathBuf, ConfigError> {
    default_config_dir()
        .map(|dir| dir.join(REGISTRY_FILE))
        .ok_or(ConfigError::NoHome)
}

fn parse_bind(text: &str) -> Result<SocketAddr, ConfigError> {
    text.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidBind(text.to_string()))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration loader with builder pattern.
///
/// ```ignore
/// let config = ConfigLoader::new(".")
///     .skip_env_vars()
///     .load()?;
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    project_root: PathBuf,
    global_config_path: Option<PathBuf>,
    env: Option<BTreeMap<String, String>>,
    skip_env: bool,
    skip_global: bool,
    skip_project: bool,
}

impl ConfigLoader {
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            global_config_path: None,
            env: None,
            skip_env: false,
            skip_global: false,
            skip_project: false,
        }
    }

    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Read `PLINTH_*` values from `vars` instead of the process environment.
    #[must_use]
    pub fn with_env_vars(mut self, vars: BTreeMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Missing config files are ignored; unreadable or malformed ones are errors.
    pub fn load(&self) -> Result<PublisherConfig, ConfigError> {
        let root = &self.project_root;
        let mut config = PublisherConfig::defaults(root);

        if !self.skip_global {
            let global = self
                .global_config_path
                .clone()
                .or_else(|| default_config_dir().map(|dir| dir.join(CONFIG_FILE)));
            if let Some(path) = global
                && let Some(layer) = load_layer(&path)?
            {
                debug!(path = %path.display(), "loaded global config");
                config.apply(layer, root)?;
            }
        }

        if !self.skip_project {
            let path = root.join(CONFIG_DIR).join(CONFIG_FILE);
            if let Some(layer) = load_layer(&path)? {
                debug!(path = %path.display(), "loaded project config");
                config.apply(layer, root)?;
            }
        }

        if !self.skip_env {
            let layer = self.env_layer()?;
            config.apply(layer, root)?;
        }

        Ok(config)
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    fn env_layer(&self) -> Result<ConfigLayer, ConfigError> {
        let autosave = match self.var("PLINTH_AUTOSAVE") {
            Some(value) => Some(parse_bool(&value).ok_or_else(|| ConfigError::InvalidEnvVar {
                name: "PLINTH_AUTOSAVE".to_string(),
                message: format!("expected bool, got `{value}`"),
            })?),
            None => None,
        };
        Ok(ConfigLayer {
            registry: self.var("PLINTH_REGISTRY").map(PathBuf::from),
            state: self.var("PLINTH_STATE").map(PathBuf::from),
            bind: self.var("PLINTH_BIND"),
            log: self.var("PLINTH_LOG"),
            autosave,
        })
    }
}

fn load_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
}
