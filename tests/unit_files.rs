//! Loading units from manifest files on disk.

use hotswap_handlers::error::ReloadError;
use hotswap_handlers::notify::LifecycleEvent;
use hotswap_handlers::prelude::*;
use hotswap_handlers::units::{FileUnitLoader, LoadReport, UnitLoader};
use parking_lot::Mutex;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const GREET: &str = r#"
description = "Greetings"

[[handlers]]
name = "hello"
methods = ["GET", "POST"]
action = "hello"
params = [{ name = "name", type = "string", default = "World" }]

[[handlers]]
name = "version"
methods = ["GET"]
respond = { version = "1.0" }
"#;

fn loader(dir: &TempDir) -> (FileUnitLoader, Registry, Arc<Mutex<Vec<LifecycleEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink: Arc<dyn EventSink> = {
        let events = Arc::clone(&events);
        Arc::new(move |event: &LifecycleEvent| events.lock().push(event.clone()))
    };
    let registry = Registry::with_event_sink(Arc::clone(&sink));
    let loader = FileUnitLoader::new(
        dir.path(),
        Arc::new(HandlerCatalog::with_builtins()),
        registry.clone(),
    )
    .with_event_sink(sink);
    (loader, registry, events)
}

#[tokio::test]
async fn test_load_all_registers_every_unit() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("greet.toml"), GREET).unwrap();
    fs::write(
        dir.path().join("status.json"),
        r#"{"handlers": [{"name": "ping", "methods": ["GET"], "respond": "pong"}]}"#,
    )
    .unwrap();
    fs::write(dir.path().join("__init__.toml"), GREET).unwrap();
    fs::write(dir.path().join("notes.txt"), "not a unit").unwrap();

    let (loader, registry, _) = loader(&dir);
    let summary = loader.load_all().unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.loaded.get("greet"), Some(&2));
    assert_eq!(summary.loaded.get("status"), Some(&1));
    assert_eq!(registry.units(), vec!["greet", "status"]);
    assert!(registry.supports("greet", "hello", "get"));
    assert!(!registry.supports("greet", "version", "POST"));

    let hello = registry.resolve("greet", "hello", Method::Get).unwrap();
    let out = hello.invoke(Params::new()).await.unwrap();
    assert_eq!(out["message"], "Hello, World!");

    let ping = registry.resolve("status", "ping", Method::Get).unwrap();
    assert_eq!(ping.invoke(Params::new()).await.unwrap(), json!("pong"));
}

#[tokio::test]
async fn test_bad_edit_keeps_previous_registration() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("greet.toml");
    fs::write(&path, GREET).unwrap();

    let (loader, registry, events) = loader(&dir);
    loader.load("greet").unwrap();

    fs::write(&path, "[[handlers]\nname = ").unwrap();
    let err = loader.reload("greet").unwrap_err();
    assert!(matches!(err, ReloadError::LoadFailure { ref unit, .. } if unit == "greet"));

    let version = registry.get("greet", "version").unwrap();
    assert_eq!(version.invoke(Params::new()).await.unwrap(), json!({"version": "1.0"}));
    assert!(
        events
            .lock()
            .iter()
            .any(|e| matches!(e, LifecycleEvent::UnitLoadFailed { unit, .. } if unit == "greet"))
    );
}

#[test]
fn test_deleted_source_unregisters_unit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("greet.toml");
    fs::write(&path, GREET).unwrap();

    let (loader, registry, events) = loader(&dir);
    loader.load("greet").unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(loader.reload("greet").unwrap(), LoadReport::Removed { handlers: 2 });
    assert!(registry.get("greet", "hello").is_none());
    assert!(loader.manifest("greet").is_none());
    assert!(events.lock().iter().any(|e| matches!(
        e,
        LifecycleEvent::FunctionsCleared { unit, function_count: 2, .. } if unit == "greet"
    )));
}

#[test]
fn test_reload_picks_up_new_handlers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("greet.toml");
    fs::write(&path, GREET).unwrap();

    let (loader, registry, _) = loader(&dir);
    loader.load("greet").unwrap();

    fs::write(
        &path,
        "[[handlers]]\nname = \"bye\"\nmethods = [\"GET\"]\nrespond = \"see you\"\n",
    )
    .unwrap();
    assert_eq!(loader.reload("greet").unwrap(), LoadReport::Loaded { handlers: 1 });

    // The old handler set is replaced, not merged.
    assert!(registry.get("greet", "hello").is_none());
    assert!(registry.get("greet", "bye").is_some());
}

#[test]
fn test_reload_all_starts_from_empty_registry() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("greet.toml"), GREET).unwrap();

    let (loader, registry, _) = loader(&dir);
    registry.register(
        "stale",
        "old",
        HandlerDescriptor::new(Handler::respond(json!(null))),
    );

    let summary = loader.reload_all().unwrap();
    assert_eq!(summary.handler_count(), 2);
    assert_eq!(registry.units(), vec!["greet"]);
}
