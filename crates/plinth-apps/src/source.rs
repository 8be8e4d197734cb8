//! Source units: one manifest file naming the handler types it exports.
//!
//! ```toml
//! module = "shop"
//! default = "Shop"
//! types = ["Shop", "Calculator"]
//! ```

use crate::error::LoadError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceUnit {
    pub module: String,
    #[serde(default)]
    pub default: Option<String>,
    pub types: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SourceUnit {
    /// Resolve `path` to exactly one manifest file.
    pub fn resolve(app: &str, path: &Path) -> Result<Self, LoadError> {
        let display = path.display().to_string();
        let metadata = fs::metadata(path).map_err(|_| LoadError::SourceMissing {
            app: app.to_string(),
            path: display.clone(),
        })?;
        if metadata.is_dir() {
            return Err(LoadError::NotAUnit {
                path: display,
                reason: "directories and packages cannot be loaded".to_string(),
            });
        }
        let text = fs::read_to_string(path).map_err(|err| LoadError::NotAUnit {
            path: display.clone(),
            reason: err.to_string(),
        })?;
        let unit: SourceUnit = toml::from_str(&text).map_err(|err| LoadError::Manifest {
            path: display.clone(),
            message: err.to_string(),
        })?;
        if unit.types.is_empty() {
            return Err(LoadError::Manifest {
                path: display,
                message: "`types` must list at least one type".to_string(),
            });
        }
        Ok(unit)
    }

    /// The exported type to instantiate: the requested one, else the
    /// declared default, else the only exported type.
    pub fn select(&self, path: &Path, requested: Option<&str>) -> Result<String, LoadError> {
        let chosen = match (requested, &self.default, self.types.as_slice()) {
            (Some(name), _, _) => name.to_string(),
            (None, Some(default), _) => default.clone(),
            (None, None, [only]) => only.clone(),
            (None, None, _) => {
                return Err(LoadError::Manifest {
                    path: path.display().to_string(),
                    message: "several types exported and no `default` declared".to_string(),
                });
            }
        };
        if self.types.iter().any(|t| *t == chosen) {
            Ok(chosen)
        } else {
            Err(LoadError::TypeNotExported {
                path: path.display().to_string(),
                type_name: chosen,
            })
        }
    }
}
