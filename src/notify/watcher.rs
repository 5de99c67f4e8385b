//! Filesystem watching for unit files and the settings file.

use crate::error::{ReloadError, Result};
use crate::sources::is_supported_extension;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Kind of change seen on a unit file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The file appeared (including being renamed into place).
    Created,
    /// The file's contents or metadata changed.
    Modified,
    /// The file was removed or renamed away.
    Deleted,
}

/// Receiver of classified change notifications.
///
/// Called on the watcher's own thread. Implementations must be quick and
/// must not block; hand real work to the scheduler.
pub trait ChangeHandler: Send + Sync + 'static {
    /// A unit file changed.
    fn on_unit_changed(&self, unit: &str, path: &Path, kind: ChangeKind);

    /// The settings file was written.
    fn on_config_changed(&self, path: &Path);
}

/// What a changed path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WatchTarget {
    Unit(String),
    Config,
}

#[derive(Debug, Clone)]
pub(crate) struct PathClassifier {
    units_dir: PathBuf,
    config_file: Option<PathBuf>,
    reserved_prefix: String,
}

impl PathClassifier {
    pub(crate) fn new(
        units_dir: PathBuf,
        config_file: Option<PathBuf>,
        reserved_prefix: impl Into<String>,
    ) -> Self {
        Self {
            units_dir,
            config_file,
            reserved_prefix: reserved_prefix.into(),
        }
    }

    pub(crate) fn classify(&self, path: &Path) -> Option<WatchTarget> {
        if self.config_file.as_deref() == Some(path) {
            return Some(WatchTarget::Config);
        }
        if path.parent() != Some(self.units_dir.as_path()) || !is_supported_extension(path) {
            return None;
        }

        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() || stem.starts_with('.') || stem.starts_with(&self.reserved_prefix) {
            return None;
        }
        Some(WatchTarget::Unit(stem.to_string()))
    }
}

/// Split a raw notify event into per-path changes.
pub(crate) fn changes(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let each = |kind: ChangeKind| -> Vec<(PathBuf, ChangeKind)> {
        event.paths.iter().map(|p| (p.clone(), kind)).collect()
    };

    match event.kind {
        EventKind::Create(_) => each(ChangeKind::Created),
        EventKind::Remove(_) => each(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                out.push((from.clone(), ChangeKind::Deleted));
            }
            if let Some(to) = event.paths.get(1) {
                out.push((to.clone(), ChangeKind::Created));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Deleted
                };
                (p.clone(), kind)
            })
            .collect(),
        EventKind::Modify(_) => each(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn dispatch(classifier: &PathClassifier, handler: &dyn ChangeHandler, event: &Event) {
    for (path, kind) in changes(event) {
        match classifier.classify(&path) {
            Some(WatchTarget::Config) if kind != ChangeKind::Deleted => {
                handler.on_config_changed(&path);
            }
            Some(WatchTarget::Unit(unit)) => handler.on_unit_changed(&unit, &path, kind),
            Some(WatchTarget::Config) | None => {}
        }
    }
}

/// Watches the unit directory and the settings file.
///
/// The unit directory is watched non-recursively. The settings file is
/// watched through its parent directory so that editors which save by
/// renaming a temporary file over it are still seen. Events are classified
/// on the notify thread and passed to a [`ChangeHandler`].
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_handlers::notify::{ChangeHandler, ChangeKind, UnitWatcher};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// struct Print;
///
/// impl ChangeHandler for Print {
///     fn on_unit_changed(&self, unit: &str, _path: &Path, kind: ChangeKind) {
///         println!("{} {:?}", unit, kind);
///     }
///
///     fn on_config_changed(&self, path: &Path) {
///         println!("settings {}", path.display());
///     }
/// }
///
/// # fn main() -> hotswap_handlers::error::Result<()> {
/// let watcher = UnitWatcher::start("apis", Some(Path::new("service.toml")), "__", Arc::new(Print))?;
/// // ...
/// watcher.stop();
/// # Ok(())
/// # }
/// ```
pub struct UnitWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Vec<PathBuf>,
}

impl UnitWatcher {
    /// Start watching.
    ///
    /// # Errors
    ///
    /// [`ReloadError::Watch`] if the unit directory or the settings file's
    /// parent directory cannot be resolved or watched.
    pub fn start(
        units_dir: impl AsRef<Path>,
        config_file: Option<&Path>,
        reserved_prefix: &str,
        handler: Arc<dyn ChangeHandler>,
    ) -> Result<Self> {
        let units_dir = resolve(units_dir.as_ref())?;
        let config_file = config_file.map(resolve_file).transpose()?;

        let mut watched = vec![units_dir.clone()];
        if let Some(parent) = config_file.as_deref().and_then(Path::parent) {
            if !watched.iter().any(|p| p == parent) {
                watched.push(parent.to_path_buf());
            }
        }

        let classifier = PathClassifier::new(units_dir, config_file, reserved_prefix);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => dispatch(&classifier, handler.as_ref(), &event),
            Err(e) => warn!(error = %e, "File watcher error"),
        })
        .map_err(|e| ReloadError::Watch(format!("Failed to create file watcher: {}", e)))?;

        for path in &watched {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    ReloadError::Watch(format!("Failed to watch '{}': {}", path.display(), e))
                })?;
            debug!(path = %path.display(), "Watching");
        }

        info!(paths = ?watched, "File watcher started");
        Ok(Self {
            watcher: Mutex::new(Some(watcher)),
            watched,
        })
    }

    /// Directories being watched.
    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Whether [`stop`](Self::stop) has not been called yet.
    pub fn is_running(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Stop watching; the notify thread shuts down.
    pub fn stop(&self) {
        if self.watcher.lock().take().is_some() {
            info!("File watcher stopped");
        }
    }
}

fn resolve(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|e| ReloadError::Watch(format!("Failed to resolve '{}': {}", path.display(), e)))
}

fn resolve_file(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| ReloadError::Watch(format!("'{}' is not a file path", path.display())))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(resolve(parent)?.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn classifier() -> PathClassifier {
        PathClassifier::new(
            PathBuf::from("/srv/apis"),
            Some(PathBuf::from("/srv/service.toml")),
            "__",
        )
    }

    #[test]
    fn test_classify() {
        let c = classifier();
        assert_eq!(
            c.classify(Path::new("/srv/apis/greet.toml")),
            Some(WatchTarget::Unit("greet".to_string()))
        );
        assert_eq!(c.classify(Path::new("/srv/service.toml")), Some(WatchTarget::Config));
        assert_eq!(c.classify(Path::new("/srv/apis/__init__.toml")), None);
        assert_eq!(c.classify(Path::new("/srv/apis/.greet.toml.swp")), None);
        assert_eq!(c.classify(Path::new("/srv/apis/readme.md")), None);
        assert_eq!(c.classify(Path::new("/srv/apis/sub/greet.toml")), None);
        assert_eq!(c.classify(Path::new("/srv/other.toml")), None);
    }

    #[test]
    fn test_event_mapping() {
        let path = PathBuf::from("/srv/apis/greet.toml");
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(path.clone());
        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone());
        let accessed = Event::new(EventKind::Access(notify::event::AccessKind::Any)).add_path(path.clone());

        assert_eq!(changes(&created), vec![(path.clone(), ChangeKind::Created)]);
        assert_eq!(changes(&modified), vec![(path.clone(), ChangeKind::Modified)]);
        assert_eq!(changes(&removed), vec![(path.clone(), ChangeKind::Deleted)]);
        assert!(changes(&accessed).is_empty());
    }

    #[test]
    fn test_rename_both() {
        let from = PathBuf::from("/srv/apis/old.toml");
        let to = PathBuf::from("/srv/apis/new.toml");
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(from.clone())
            .add_path(to.clone());

        assert_eq!(
            changes(&event),
            vec![(from, ChangeKind::Deleted), (to, ChangeKind::Created)]
        );
    }

    struct Recorder {
        tx: Mutex<mpsc::Sender<(String, ChangeKind)>>,
    }

    impl ChangeHandler for Recorder {
        fn on_unit_changed(&self, unit: &str, _path: &Path, kind: ChangeKind) {
            let _ = self.tx.lock().send((unit.to_string(), kind));
        }

        fn on_config_changed(&self, _path: &Path) {
            let _ = self.tx.lock().send(("<config>".to_string(), ChangeKind::Modified));
        }
    }

    #[test]
    fn test_watch_unit_directory() {
        let temp_dir = TempDir::new().unwrap();
        let units = temp_dir.path().join("apis");
        fs::create_dir(&units).unwrap();
        let settings = temp_dir.path().join("service.toml");

        let (tx, rx) = mpsc::channel();
        let watcher = UnitWatcher::start(
            &units,
            Some(&settings),
            "__",
            Arc::new(Recorder { tx: Mutex::new(tx) }),
        )
        .unwrap();
        assert_eq!(watcher.watched_paths().len(), 2);

        fs::write(units.join("greet.toml"), "").unwrap();
        let (unit, _) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(unit, "greet");

        fs::write(&settings, "[server]\nport = 9000\n").unwrap();
        let seen_config = (0..10).any(|_| {
            rx.recv_timeout(Duration::from_secs(1))
                .map(|(unit, _)| unit == "<config>")
                .unwrap_or(false)
        });
        assert!(seen_config);

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel();
        let result = UnitWatcher::start(
            temp_dir.path().join("absent"),
            None,
            "__",
            Arc::new(Recorder { tx: Mutex::new(tx) }),
        );
        assert!(matches!(result, Err(ReloadError::Watch(_))));
    }
}
