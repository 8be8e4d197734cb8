use crate::support::{exit_with, print_json, to_json_or_exit, yes_no};
use plinth_apps::{AppListing, AppStatus, ApplicationSpec};
use plinth_kernel::{DispatchError, split_cli_args};
use plinth_publisher::{PublishError, Publisher};
use serde_json::json;

/// Top-level commands; an application with one of these names could never
/// be called from the CLI.
pub const COMMAND_NAMES: &[(&str, &str)] = &[
    ("add", "Register an application from a source unit"),
    ("remove", "Unload an application and delete its spec"),
    ("list", "List registered applications"),
    ("getapp", "Show one application's spec and status"),
    ("savestate", "Write every application spec to a snapshot file"),
    ("loadstate", "Add and load every application from a snapshot file"),
    ("serve", "Serve every network-enabled application over HTTP"),
    ("describe", "Print the description document"),
    ("help", "Print help"),
];

pub struct AddArgs {
    pub name: String,
    pub target: String,
    pub no_cli: bool,
    pub no_network: bool,
    pub args: Vec<String>,
}

pub fn run_add(publisher: &Publisher, args: AddArgs, json_output: bool) {
    if COMMAND_NAMES.iter().any(|(command, _)| *command == args.name) {
        exit_with(PublishError::Usage(format!(
            "`{}` is a plinth command and cannot name an application",
            args.name
        )));
    }
    let raw = split_cli_args(args.args.as_slice())
        .unwrap_or_else(|e| exit_with(DispatchError::from(e).into()));
    let mut spec = ApplicationSpec::from_target(args.name, &args.target).with_args(raw.positional);
    spec.kwargs = raw.named;
    spec.cli_enabled = !args.no_cli;
    spec.network_enabled = !args.no_network;

    let added = publisher.add(spec).unwrap_or_else(|e| exit_with(e));
    if json_output {
        print_json(&json!({
            "action": "app.add",
            "registryPath": publisher.config().registry.display().to_string(),
            "app": to_json_or_exit(&added),
        }));
    } else {
        println!(
            "plinth add\n  Added: {}\n  Source: {}{}\n  Path: {}",
            added.name,
            added.path,
            added.type_name.as_deref().map(|t| format!(" ({t})")).unwrap_or_default(),
            publisher.config().registry.display()
        );
    }
}

pub fn run_remove(publisher: &Publisher, name: &str, json_output: bool) {
    let removed = publisher.remove(name).unwrap_or_else(|e| exit_with(e));
    if json_output {
        print_json(&json!({
            "action": "app.remove",
            "app": to_json_or_exit(&removed),
        }));
    } else {
        println!("plinth remove\n  Removed: {}", removed.name);
    }
}

fn status_label(status: AppStatus) -> &'static str {
    match status {
        AppStatus::SpecOnly => "spec-only",
        AppStatus::Loaded => "loaded",
    }
}

pub fn run_list(publisher: &Publisher, json_output: bool) {
    let listings = publisher.list();
    if json_output {
        print_json(&to_json_or_exit(&listings));
        return;
    }
    if listings.is_empty() {
        println!("No applications registered.");
        return;
    }
    let width = listings.iter().map(|l| l.name.len()).max().unwrap_or(0);
    for listing in &listings {
        println!(
            "{:<width$}  {:<9}  {}{}",
            listing.name,
            status_label(listing.status),
            listing.path,
            listing.type_name.as_deref().map(|t| format!(":{t}")).unwrap_or_default(),
        );
    }
}

pub fn run_getapp(publisher: &Publisher, name: &str, json_output: bool) {
    let listing: AppListing = publisher.get(name).unwrap_or_else(|e| exit_with(e));
    if json_output {
        print_json(&to_json_or_exit(&listing));
    } else {
        println!(
            "plinth getapp\n  Name: {}\n  Source: {}\n  Type: {}\n  Status: {}\n  CLI: {}\n  Network: {}",
            listing.name,
            listing.path,
            listing.type_name.as_deref().unwrap_or("(default)"),
            status_label(listing.status),
            yes_no(listing.cli_enabled),
            yes_no(listing.network_enabled),
        );
    }
}
