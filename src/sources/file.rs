//! File-based configuration source.

use super::{ConfigSource, SourceValues};
use crate::error::{ReloadError, Result};
use config::File;
use std::path::{Path, PathBuf};

/// File extensions understood by the `config` crate in this build.
///
/// Shared by the settings file and by unit manifests.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Whether `path` has one of [`SUPPORTED_EXTENSIONS`].
pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

/// Settings loaded from a YAML, TOML or JSON file.
///
/// The format is detected from the file extension. A required file that is
/// missing fails the load; an optional one contributes nothing, so the
/// service can start on defaults and pick the file up once it is created.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_handlers::sources::FileSource;
///
/// let source = FileSource::new("service.toml").optional();
/// ```
pub struct FileSource {
    path: PathBuf,
    priority: i32,
    required: bool,
}

impl FileSource {
    /// Create a required file source.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            priority: 100,
            required: true,
        }
    }

    /// Allow the file to be absent.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Set the priority for this source.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_extension(&self) -> Result<()> {
        if is_supported_extension(&self.path) {
            Ok(())
        } else {
            Err(ReloadError::Config(format!(
                "Unsupported settings file '{}'. Supported: {}",
                self.path.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            )))
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<SourceValues> {
        self.check_extension()?;

        if !self.path.exists() {
            if self.required {
                return Err(ReloadError::Config(format!(
                    "Settings file not found: {}",
                    self.path.display()
                )));
            }
            tracing::debug!(path = %self.path.display(), "optional settings file absent, using defaults");
            return Ok(SourceValues::new());
        }

        config::Config::builder()
            .add_source(File::from(self.path.clone()).required(true))
            .build()
            .and_then(|built| built.try_deserialize::<SourceValues>())
            .map_err(|e| ReloadError::Config(format!("Failed to read '{}': {}", self.path.display(), e)))
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension(Path::new("a.toml")));
        assert!(is_supported_extension(Path::new("a.yml")));
        assert!(is_supported_extension(Path::new("dir/a.json")));
        assert!(!is_supported_extension(Path::new("a.txt")));
        assert!(!is_supported_extension(Path::new("toml")));
    }

    #[test]
    fn test_load_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("service.toml");
        fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let values = FileSource::new(&path).load().unwrap();
        assert!(values.contains_key("server"));
    }

    #[test]
    fn test_required_missing_fails() {
        let result = FileSource::new("/nonexistent/service.toml").load();
        assert!(matches!(result, Err(ReloadError::Config(_))));
    }

    #[test]
    fn test_optional_missing_is_empty() {
        let values = FileSource::new("/nonexistent/service.toml")
            .optional()
            .load()
            .unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        assert!(FileSource::new("service.ini").optional().load().is_err());
    }

    #[test]
    fn test_name_and_priority() {
        let source = FileSource::new("service.yaml").with_priority(150);
        assert!(source.name().contains("service.yaml"));
        assert_eq!(source.priority(), 150);
    }
}
