use crate::support::{exit_with, print_json};
use plinth_publisher::Publisher;
use serde_json::json;
use std::path::PathBuf;

pub fn run_save(publisher: &Publisher, path: Option<PathBuf>, json_output: bool) {
    let (path, state) = publisher.save_state(path.as_deref()).unwrap_or_else(|e| exit_with(e));
    if json_output {
        print_json(&json!({
            "action": "state.save",
            "statePath": path.display().to_string(),
            "apps": state.apps.len(),
            "digest": state.digest,
        }));
    } else {
        println!(
            "plinth savestate\n  Saved: {} application(s)\n  Path: {}\n  Digest: {}",
            state.apps.len(),
            path.display(),
            state.digest
        );
    }
}

pub fn run_load(
    publisher: &Publisher,
    path: Option<PathBuf>,
    skip_missing: bool,
    json_output: bool,
) {
    let report = publisher
        .load_state(path.as_deref(), skip_missing)
        .unwrap_or_else(|e| exit_with(e));
    if json_output {
        print_json(&json!({
            "action": "state.load",
            "loaded": report.loaded,
            "skipped": report.skipped,
        }));
    } else {
        println!("plinth loadstate\n  Loaded: {}", report.loaded.join(", "));
        if !report.skipped.is_empty() {
            println!("  Skipped: {}", report.skipped.join(", "));
        }
    }
}
