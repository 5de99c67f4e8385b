//! Loading units from manifest files into the registry.

use super::catalog::HandlerCatalog;
use super::manifest::{HandlerBinding, UnitManifest, parse_manifest};
use crate::core::{LiveConfig, ServiceConfig};
use crate::error::{ReloadError, Result};
use crate::notify::{EventSink, LifecycleEvent};
use crate::registry::{Handler, HandlerDescriptor, Registry};
use crate::sources::{SUPPORTED_EXTENSIONS, is_supported_extension};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a load, unload or reload did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadReport {
    /// The unit is registered with this many handlers.
    Loaded {
        /// Handler count after the swap
        handlers: usize,
    },
    /// The unit was unregistered.
    Removed {
        /// Handler count removed (0 if it was not registered)
        handlers: usize,
    },
}

/// Result of loading every unit in the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    /// Loaded units and their handler counts.
    pub loaded: BTreeMap<String, usize>,
    /// Units that failed, with the cause.
    pub failed: BTreeMap<String, String>,
}

impl ReloadSummary {
    /// Whether every discovered unit loaded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total handlers registered by the loaded units.
    pub fn handler_count(&self) -> usize {
        self.loaded.values().sum()
    }
}

/// Blocking unit operations driven by the reload coordinator.
///
/// Every method is called from a worker-pool thread and may block on IO.
/// Implementations must leave a unit's previous registration in place when
/// a load fails.
pub trait UnitLoader: Send + Sync + 'static {
    /// Parse `unit` and publish its handlers.
    fn load(&self, unit: &str) -> Result<LoadReport>;

    /// Remove every handler of `unit`.
    fn unload(&self, unit: &str) -> LoadReport;

    /// Bring `unit` in line with its current source.
    fn reload(&self, unit: &str) -> Result<LoadReport> {
        self.unload(unit);
        self.load(unit)
    }

    /// Re-read and publish the service configuration.
    fn reload_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Loads units from a flat directory of manifest files.
///
/// The file stem is the unit name. Handlers are bound to callables from a
/// [`HandlerCatalog`] or to static responses, built into a fresh table and
/// swapped into the [`Registry`] in one step.
pub struct FileUnitLoader {
    dir: PathBuf,
    reserved_prefix: String,
    catalog: Arc<HandlerCatalog>,
    registry: Registry,
    manifests: Mutex<HashMap<String, Arc<UnitManifest>>>,
    config: Option<LiveConfig<ServiceConfig>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl FileUnitLoader {
    /// Loader over `dir` publishing into `registry`.
    pub fn new(dir: impl Into<PathBuf>, catalog: Arc<HandlerCatalog>, registry: Registry) -> Self {
        Self {
            dir: dir.into(),
            reserved_prefix: "__".to_string(),
            catalog,
            registry,
            manifests: Mutex::new(HashMap::new()),
            config: None,
            sink: None,
        }
    }

    /// Files whose stem starts with `prefix` are ignored.
    pub fn with_reserved_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_prefix = prefix.into();
        self
    }

    /// Configuration reloaded by [`UnitLoader::reload_config`].
    pub fn with_config(mut self, config: LiveConfig<ServiceConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Where load failures and config reloads are reported.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The unit directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The parsed manifest of a loaded unit.
    pub fn manifest(&self, unit: &str) -> Option<Arc<UnitManifest>> {
        self.manifests.lock().get(unit).cloned()
    }

    /// Whether a file stem names a loadable unit.
    pub fn is_unit_name(&self, stem: &str) -> bool {
        !stem.is_empty()
            && !stem.starts_with('.')
            && !stem.starts_with(&self.reserved_prefix)
            && !stem.contains(['/', '\\'])
    }

    /// The manifest file currently backing `unit`, if any.
    ///
    /// When several extensions exist for one stem, the first in
    /// [`SUPPORTED_EXTENSIONS`] order wins.
    pub fn source_path(&self, unit: &str) -> Option<PathBuf> {
        if !self.is_unit_name(unit) {
            return None;
        }
        SUPPORTED_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", unit, ext)))
            .find(|path| path.is_file())
    }

    /// Unit names present in the directory, sorted.
    ///
    /// A missing directory holds no units.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory exists but cannot be read.
    pub fn discover(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut units = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || !is_supported_extension(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if self.is_unit_name(stem) {
                    units.push(stem.to_string());
                }
            }
        }
        units.sort();
        units.dedup();
        Ok(units)
    }

    /// Load every discovered unit; failures are collected, not fatal.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory cannot be enumerated.
    pub fn load_all(&self) -> Result<ReloadSummary> {
        let mut summary = ReloadSummary::default();
        for unit in self.discover()? {
            match self.load(&unit) {
                Ok(LoadReport::Loaded { handlers }) => {
                    summary.loaded.insert(unit, handlers);
                }
                Ok(LoadReport::Removed { .. }) => {}
                Err(e) => {
                    summary.failed.insert(unit, failure_reason(&e));
                }
            }
        }

        info!(
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            handlers = summary.handler_count(),
            "Loaded units"
        );
        Ok(summary)
    }

    /// Clear the whole registry, then load every unit again.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory cannot be enumerated.
    pub fn reload_all(&self) -> Result<ReloadSummary> {
        self.registry.clear_all();
        self.manifests.lock().clear();
        self.load_all()
    }

    fn emit(&self, event: LifecycleEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(&event);
        }
    }

    fn report_failure(&self, unit: &str, err: ReloadError) -> ReloadError {
        let reason = failure_reason(&err);
        warn!(unit, error = %reason, "Unit failed to load; keeping previous registration");
        self.emit(LifecycleEvent::UnitLoadFailed {
            unit: unit.to_string(),
            reason,
        });
        err
    }

    fn bind(&self, unit: &str, manifest: &UnitManifest) -> Result<Vec<(String, HandlerDescriptor)>> {
        manifest
            .handlers
            .iter()
            .map(|spec| -> Result<(String, HandlerDescriptor)> {
                let methods = spec
                    .method_set()
                    .map_err(|reason| ReloadError::load_failure(unit, reason))?;
                let handler = match spec
                    .binding()
                    .map_err(|reason| ReloadError::load_failure(unit, reason))?
                {
                    HandlerBinding::Action(action) => {
                        self.catalog.get(action).cloned().ok_or_else(|| {
                            ReloadError::load_failure(
                                unit,
                                format!("handler '{}' binds unknown action '{}'", spec.name, action),
                            )
                        })?
                    }
                    HandlerBinding::Respond(value) => Handler::respond(value.clone()),
                };

                let mut descriptor = HandlerDescriptor::new(handler)
                    .with_methods(methods)
                    .with_params(spec.params.clone());
                if let Some(description) = spec.description.as_ref().or(manifest.description.as_ref()) {
                    descriptor = descriptor.with_description(description.clone());
                }
                Ok((spec.name.clone(), descriptor))
            })
            .collect()
    }

    fn parse_and_swap(&self, unit: &str, path: &Path) -> Result<LoadReport> {
        let manifest = parse_manifest(unit, path)?;
        let handlers = self.bind(unit, &manifest)?;
        let count = handlers.len();

        self.registry.replace_unit(unit, handlers);
        self.manifests.lock().insert(unit.to_string(), Arc::new(manifest));

        debug!(unit, handlers = count, path = %path.display(), "Unit published");
        Ok(LoadReport::Loaded { handlers: count })
    }
}

fn failure_reason(err: &ReloadError) -> String {
    match err {
        ReloadError::LoadFailure { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

impl UnitLoader for FileUnitLoader {
    fn load(&self, unit: &str) -> Result<LoadReport> {
        let path = self.source_path(unit).ok_or_else(|| {
            ReloadError::load_failure(
                unit,
                format!("no manifest for unit in '{}'", self.dir.display()),
            )
        });
        path.and_then(|path| self.parse_and_swap(unit, &path))
            .map_err(|e| self.report_failure(unit, e))
    }

    fn unload(&self, unit: &str) -> LoadReport {
        let outcome = self.registry.clear_unit(unit);
        self.manifests.lock().remove(unit);
        LoadReport::Removed {
            handlers: outcome.count(),
        }
    }

    fn reload(&self, unit: &str) -> Result<LoadReport> {
        match self.source_path(unit) {
            None => {
                let report = self.unload(unit);
                info!(unit, "Unit source removed; unregistered");
                Ok(report)
            }
            Some(path) => self
                .parse_and_swap(unit, &path)
                .map_err(|e| self.report_failure(unit, e)),
        }
    }

    fn reload_config(&self) -> Result<()> {
        let Some(config) = &self.config else {
            return Err(ReloadError::Config("no live configuration attached".to_string()));
        };

        let applied = config.reload()?;
        info!(
            host = %applied.server.host,
            port = applied.server.port,
            level = %applied.logging.level,
            "Configuration reloaded"
        );
        self.emit(LifecycleEvent::ConfigReloaded {
            host: applied.server.host.clone(),
            port: applied.server.port,
            hot_reload: applied.units.hot_reload,
            log_level: applied.logging.level.clone(),
            debounce_ms: applied.reload.debounce_ms,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Method;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const GREET: &str = r#"
[[handlers]]
name = "hello"
methods = ["GET", "POST"]
action = "hello"

[[handlers]]
name = "version"
respond = "1.0"
"#;

    fn loader(dir: &TempDir) -> (FileUnitLoader, Registry) {
        let registry = Registry::new();
        let loader = FileUnitLoader::new(
            dir.path(),
            Arc::new(HandlerCatalog::with_builtins()),
            registry.clone(),
        );
        (loader, registry)
    }

    #[test]
    fn test_load_publishes_handlers() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("greet.toml"), GREET).unwrap();
        let (loader, registry) = loader(&dir);

        assert_eq!(loader.load("greet").unwrap(), LoadReport::Loaded { handlers: 2 });
        assert!(registry.supports("greet", "hello", "GET"));
        assert!(registry.resolve("greet", "version", Method::Get).is_err());
        assert!(loader.manifest("greet").is_some());
    }

    #[test]
    fn test_unknown_action_keeps_previous_registration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("greet.toml");
        fs::write(&path, GREET).unwrap();
        let (loader, registry) = loader(&dir);
        loader.load("greet").unwrap();

        fs::write(&path, "[[handlers]]\nname = \"hello\"\naction = \"missing\"\n").unwrap();
        let err = loader.reload("greet").unwrap_err();

        assert!(err.to_string().contains("missing"));
        assert_eq!(registry.handler_count(), 2);
        assert!(registry.get("greet", "version").is_some());
    }

    #[test]
    fn test_reload_of_deleted_unit_unregisters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("greet.toml");
        fs::write(&path, GREET).unwrap();
        let (loader, registry) = loader(&dir);
        loader.load("greet").unwrap();

        fs::remove_file(&path).unwrap();
        assert_eq!(loader.reload("greet").unwrap(), LoadReport::Removed { handlers: 2 });
        assert!(registry.get("greet", "hello").is_none());
        assert!(loader.manifest("greet").is_none());
    }

    #[test]
    fn test_load_of_missing_unit_fails() {
        let dir = TempDir::new().unwrap();
        let (loader, registry) = loader(&dir);
        assert!(matches!(
            loader.load("ghost"),
            Err(ReloadError::LoadFailure { .. })
        ));
        assert_eq!(registry.handler_count(), 0);
    }

    #[test]
    fn test_discover_skips_reserved_hidden_and_unsupported() {
        let dir = TempDir::new().unwrap();
        for file in ["b.toml", "a.yaml", "__init__.toml", ".hidden.json", "notes.txt"] {
            fs::write(dir.path().join(file), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested.toml")).unwrap();
        let (loader, _) = loader(&dir);

        assert_eq!(loader.discover().unwrap(), vec!["a", "b"]);
        assert!(loader.source_path("__init__").is_none());
    }

    #[test]
    fn test_load_all_collects_failures() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("greet.toml"), GREET).unwrap();
        fs::write(dir.path().join("broken.toml"), "[[handlers]\n").unwrap();
        let (loader, registry) = loader(&dir);

        let summary = loader.load_all().unwrap();
        assert_eq!(summary.loaded.get("greet"), Some(&2));
        assert!(summary.failed.contains_key("broken"));
        assert!(!summary.is_complete());
        assert_eq!(registry.units(), vec!["greet"]);
    }

    #[test]
    fn test_reload_all_drops_stale_units() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("greet.toml"), GREET).unwrap();
        let (loader, registry) = loader(&dir);
        registry.register("stale", "x", HandlerDescriptor::new(Handler::respond(json!(null))));
        loader.load_all().unwrap();

        let summary = loader.reload_all().unwrap();
        assert!(summary.is_complete());
        assert_eq!(registry.units(), vec!["greet"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new();
        let loader = FileUnitLoader::new(
            dir.path().join("absent"),
            Arc::new(HandlerCatalog::new()),
            registry,
        );
        assert!(loader.discover().unwrap().is_empty());
    }

    #[test]
    fn test_failure_is_reported_to_sink() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.json"), "{").unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let (loader, _) = loader(&dir);
        let loader = loader.with_event_sink(Arc::new(move |event: &LifecycleEvent| {
            seen_clone.lock().push(event.name());
        }));

        assert!(loader.load("bad").is_err());
        assert_eq!(*seen.lock(), vec!["UNIT_LOAD_FAILED"]);
    }

    #[test]
    fn test_reload_config_without_live_config() {
        let dir = TempDir::new().unwrap();
        let (loader, _) = loader(&dir);
        assert!(matches!(loader.reload_config(), Err(ReloadError::Config(_))));
    }
}
