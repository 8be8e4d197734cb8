//! Integration tests: application lifecycle and snapshot restore.

use plinth_apps::{
    ApiFactory, AppError, AppRegistry, AppStatus, ApplicationSpec, HandlerCatalog, LoadError,
};
use plinth_kernel::{Api, ParamKind, ParamSpec, RegistryTree};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

struct Adder {
    offset: i64,
}

fn catalog() -> HandlerCatalog {
    let mut api = Api::<Adder>::new("Adder");
    api.method("add")
        .param(ParamSpec::new("a", ParamKind::Int))
        .param(ParamSpec::new("b", ParamKind::Int))
        .blocking(|adder: &Adder, args| Ok(json!(adder.offset + args.int("a")? + args.int("b")?)))
        .expect("add should declare");
    let factory = ApiFactory::new(api, |args| Ok(Adder { offset: args.int("offset")? }))
        .with_constructor(&[ParamSpec::new("offset", ParamKind::Int).with_default(0)])
        .expect("constructor should synthesize");
    let mut catalog = HandlerCatalog::new();
    catalog.register(factory).expect("factory should register");
    catalog
}

fn write_unit(dir: &Path, file: &str) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, "module = \"adder\"\ntypes = [\"Adder\"]\n").expect("unit should be written");
    path
}

fn spec(name: &str, path: &Path) -> ApplicationSpec {
    ApplicationSpec::new(name, path.display().to_string())
}

#[test]
fn add_load_unload_remove() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let unit = write_unit(dir.path(), "adder.toml");
    let catalog = catalog();
    let mut tree = RegistryTree::new();
    let mut apps = AppRegistry::in_memory();

    apps.add(spec("one", &unit).with_kwarg("offset", 100)).expect("add should succeed");
    assert_eq!(apps.status("one"), Some(AppStatus::SpecOnly));
    assert_eq!(apps.get("one").and_then(|s| s.module.as_deref()), Some("adder"));

    apps.load("one", &catalog, &mut tree).expect("load should succeed");
    assert_eq!(apps.status("one"), Some(AppStatus::Loaded));
    let resolved = tree.resolve("one.add").expect("one.add should resolve");
    let result = resolved
        .entry
        .invoke(
            &resolved.path,
            plinth_kernel::RawArgs::positional(["1", "2"]),
            plinth_kernel::Channel::Cli,
            plinth_kernel::CallContext::Blocking,
        )
        .into_ready()
        .expect("add should succeed");
    assert_eq!(result, json!(103));

    assert!(apps.unload("one", &mut tree).expect("unload should succeed"));
    assert!(tree.resolve("one.add").is_err());
    assert_eq!(apps.status("one"), Some(AppStatus::SpecOnly));

    apps.load("one", &catalog, &mut tree).expect("reload should succeed");
    apps.remove("one", &mut tree).expect("remove should succeed");
    assert!(apps.get("one").is_none());
    assert!(tree.is_empty());
}

#[test]
fn duplicate_names_and_bad_sources_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let unit = write_unit(dir.path(), "adder.toml");
    let mut apps = AppRegistry::in_memory();
    apps.add(spec("one", &unit)).expect("add should succeed");

    let err = apps.add(spec("one", &unit)).expect_err("name is taken");
    assert_eq!(err, AppError::NameCollision("one".into()));
    assert_eq!(err.exit_code(), 5);

    let err = apps.add(spec("dir", dir.path())).expect_err("directories are not units");
    assert!(matches!(err, AppError::Load(LoadError::NotAUnit { .. })));

    let err = apps
        .add(spec("typed", &unit).with_type("Shop"))
        .expect_err("Shop is not exported");
    assert!(matches!(err, AppError::Load(LoadError::TypeNotExported { .. })));
    assert_eq!(apps.specs().len(), 1);
}

#[test]
fn registry_file_persists_after_each_mutation() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let unit = write_unit(dir.path(), "adder.toml");
    let registry_path = dir.path().join(".plinth/registry.json");
    let mut tree = RegistryTree::new();

    let mut apps = AppRegistry::open(&registry_path, true).expect("open should succeed");
    apps.add(spec("one", &unit)).expect("add should succeed");
    apps.add(spec("two", &unit)).expect("add should succeed");

    let reopened = AppRegistry::open(&registry_path, true).expect("reopen should succeed");
    let names: Vec<_> = reopened.list().into_iter().map(|l| l.name).collect();
    assert_eq!(names, vec!["one", "two"]);

    apps.remove("one", &mut tree).expect("remove should succeed");
    let reopened = AppRegistry::open(&registry_path, true).expect("reopen should succeed");
    assert!(reopened.get("one").is_none());
    assert!(reopened.get("two").is_some());
}

#[test]
fn failed_write_leaves_the_registry_unchanged() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let unit = write_unit(dir.path(), "adder.toml");
    let registry_path = dir.path().join("registry.json");
    let lock = plinth_apps::store::lock_path(&registry_path);
    let mut tree = RegistryTree::new();
    let mut apps = AppRegistry::open(&registry_path, true).expect("open should succeed");

    fs::write(&lock, "").expect("lock should be taken");
    let err = apps.add(spec("a", &unit)).expect_err("the lock is busy");
    assert!(matches!(err, AppError::Store(_)));
    assert!(apps.get("a").is_none());
    assert!(!registry_path.exists());

    fs::remove_file(&lock).expect("lock should be released");
    apps.add(spec("a", &unit)).expect("retry should succeed");
    assert!(registry_path.exists());

    fs::write(&lock, "").expect("lock should be taken again");
    apps.remove("a", &mut tree).expect_err("the lock is busy");
    assert!(apps.get("a").is_some());
    fs::remove_file(&lock).expect("lock should be released");
    let reopened = AppRegistry::open(&registry_path, true).expect("reopen should succeed");
    assert!(reopened.get("a").is_some());
}

fn saved_snapshot(dir: &Path, count: usize) -> (PathBuf, Vec<PathBuf>) {
    let mut apps = AppRegistry::in_memory();
    let mut units = Vec::new();
    for i in 0..count {
        let unit = write_unit(dir, &format!("unit{i}.toml"));
        apps.add(spec(&format!("app{i}"), &unit)).expect("add should succeed");
        units.push(unit);
    }
    let snapshot = dir.join("state.json");
    apps.save_state(&snapshot).expect("save should succeed");
    (snapshot, units)
}

#[test]
fn snapshot_restores_every_application() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let (snapshot, _) = saved_snapshot(dir.path(), 3);
    let mut tree = RegistryTree::new();
    let mut apps = AppRegistry::in_memory();
    let report = apps
        .load_state(&snapshot, false, &catalog(), &mut tree)
        .expect("restore should succeed");
    assert_eq!(report.loaded, vec!["app0", "app1", "app2"]);
    assert!(report.skipped.is_empty());
    assert_eq!(tree.len(), 3);
}

#[test]
fn missing_source_is_skipped_when_asked() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let (snapshot, units) = saved_snapshot(dir.path(), 3);
    fs::remove_file(&units[1]).expect("unit should be deleted");
    let mut tree = RegistryTree::new();
    let mut apps = AppRegistry::in_memory();
    let report = apps
        .load_state(&snapshot, true, &catalog(), &mut tree)
        .expect("restore should not abort");
    assert_eq!(report.loaded, vec!["app0", "app2"]);
    assert_eq!(report.skipped, vec!["app1"]);
    assert!(tree.resolve("app2.add").is_ok());
}

#[test]
fn missing_source_aborts_otherwise_keeping_earlier_loads() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let (snapshot, units) = saved_snapshot(dir.path(), 3);
    fs::remove_file(&units[1]).expect("unit should be deleted");
    let mut tree = RegistryTree::new();
    let mut apps = AppRegistry::in_memory();
    let err = apps
        .load_state(&snapshot, false, &catalog(), &mut tree)
        .expect_err("restore should abort");
    assert!(matches!(err, AppError::Load(LoadError::SourceMissing { .. })));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(apps.status("app0"), Some(AppStatus::Loaded));
    assert!(apps.get("app2").is_none());
    assert!(tree.resolve("app0.add").is_ok());
}
