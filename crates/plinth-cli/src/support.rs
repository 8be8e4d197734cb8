use crate::builtin;
use plinth_apps::AppError;
use plinth_kernel::DispatchError;
use plinth_publisher::{
    ConfigLoader, PublishError, Publisher, PublisherConfig, RegistryScope, discover_app,
    global_registry_path,
};
use serde_json::Value;
use std::path::PathBuf;

/// Layered configuration for the current directory, with the registry
/// overridden by `--global` or `--registry`.
pub fn load_config_or_exit(global: bool, registry: Option<PathBuf>) -> PublisherConfig {
    let cwd = std::env::current_dir().unwrap_or_else(|e| {
        eprintln!("error: failed to resolve current directory: {e}");
        std::process::exit(1);
    });
    let mut config = ConfigLoader::new(cwd).load().unwrap_or_else(|e| exit_with(e.into()));
    if global {
        config.registry = global_registry_path().unwrap_or_else(|e| exit_with(e.into()));
    }
    if let Some(path) = registry {
        config.registry = path;
    }
    config
}

/// Switch `config` to the per-user registry when `app` is only found
/// there. An app found nowhere keeps the project registry so the call
/// reports it as not found.
pub fn discover_registry_or_exit(config: &mut PublisherConfig, app: &str) {
    if app.starts_with('-') || app.starts_with('_') {
        return;
    }
    let global = global_registry_path().ok();
    match discover_app(app, &config.registry, global.as_deref()) {
        Ok(found) if found.scope == RegistryScope::Global => config.registry = found.registry,
        Ok(_) | Err(PublishError::App(AppError::NotFound(_))) => {}
        Err(err) => exit_with(err),
    }
}

pub fn open_publisher_or_exit(config: PublisherConfig) -> Publisher {
    let catalog = builtin::catalog().unwrap_or_else(|e| exit_with(e.into()));
    Publisher::open(config, catalog).unwrap_or_else(|e| exit_with(e))
}

/// Print `err` to stderr and exit with its class's code. Validation
/// failures list one line per field.
pub fn exit_with(err: PublishError) -> ! {
    match &err {
        PublishError::Dispatch(DispatchError::Validation(validation)) => {
            eprintln!("error: invalid arguments");
            for field in &validation.errors {
                eprintln!("  {}: {}", field.field, field.message);
            }
        }
        _ => eprintln!("error: {err}"),
    }
    std::process::exit(err.exit_code());
}

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("error: failed to render JSON: {e}");
            std::process::exit(1);
        }
    }
}

pub fn to_json_or_exit<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        eprintln!("error: failed to render JSON: {e}");
        std::process::exit(1);
    })
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
