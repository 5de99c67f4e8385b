//! Layered settings loader.

use crate::error::{ReloadError, Result};
use crate::sources::ConfigSource;
use serde::de::DeserializeOwned;

/// Reads every configured source and merges them into one settings value.
///
/// Sources are kept ordered by priority (lowest first); on load each source's
/// keys override what lower-priority sources set. The loader holds no cached
/// state, so every call re-reads all sources.
pub struct SettingsLoader {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl SettingsLoader {
    /// Create a loader with no sources.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a source, keeping sources ordered by priority.
    ///
    /// Sources with equal priority keep insertion order.
    pub fn add_source(&mut self, source: Box<dyn ConfigSource>) {
        let at = self
            .sources
            .partition_point(|existing| existing.priority() <= source.priority());
        self.sources.insert(at, source);
    }

    /// Whether no sources were added.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Load and merge every source into `T`.
    ///
    /// With no sources, `T` is deserialized from an empty document, which
    /// yields its serde defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::Config`] naming the offending source if a source
    /// cannot be read or merged, or if the merged document does not
    /// deserialize into `T`.
    pub fn load<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let mut builder = config::Config::builder();

        for source in &self.sources {
            let values = source.load().map_err(|e| {
                ReloadError::Config(format!("source '{}': {}", source.name(), e))
            })?;

            let mut leaves = Vec::new();
            for (key, value) in values {
                flatten(key, value, &mut leaves);
            }
            for (key, value) in leaves {
                builder = builder.set_override(key.as_str(), value).map_err(|e| {
                    ReloadError::Config(format!("merging source '{}': {}", source.name(), e))
                })?;
            }
        }

        builder
            .build()
            .map_err(|e| ReloadError::Config(format!("building settings: {}", e)))?
            .try_deserialize::<T>()
            .map_err(|e| ReloadError::Config(format!("invalid settings: {}", e)))
    }

    /// Source names in merge order.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

/// Split nested tables into dotted leaf keys so a source only overrides
/// the keys it actually sets.
fn flatten(key: String, value: config::Value, out: &mut Vec<(String, config::Value)>) {
    if matches!(value.kind, config::ValueKind::Table(_)) {
        if let Ok(table) = value.into_table() {
            for (child, child_value) in table {
                flatten(format!("{}.{}", key, child), child_value, out);
            }
        }
    } else {
        out.push((key, value));
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}
