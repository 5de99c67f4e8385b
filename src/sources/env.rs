//! Environment variable configuration source.

use super::{ConfigSource, SourceValues};
use crate::error::{ReloadError, Result};
use config::Environment;

/// Settings overrides taken from environment variables.
///
/// Variables are matched by prefix and split into nested keys by the
/// separator, e.g. with prefix `HOTSWAP` and separator `__`,
/// `HOTSWAP__RELOAD__DEBOUNCE_MS=250` sets `reload.debounce_ms`.
pub struct EnvSource {
    prefix: String,
    separator: String,
    priority: i32,
}

impl EnvSource {
    /// Create a new environment variable source.
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
            priority: 300,
        }
    }

    /// Set the priority for this source.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> Result<SourceValues> {
        let env = Environment::with_prefix(&self.prefix)
            .separator(&self.separator)
            .list_separator(",")
            .with_list_parse_key("auth.valid_tokens")
            .with_list_parse_key("auth.admin_tokens")
            .try_parsing(true);

        config::Config::builder()
            .add_source(env)
            .build()
            .and_then(|built| built.try_deserialize::<SourceValues>())
            .map_err(|e| ReloadError::Config(format!("Failed to read environment overrides: {}", e)))
    }

    fn name(&self) -> String {
        format!("env:{}*", self.prefix)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_source_defaults() {
        let source = EnvSource::new("HOTSWAP", "__");
        assert_eq!(source.prefix, "HOTSWAP");
        assert_eq!(source.separator, "__");
        assert_eq!(source.priority(), 300);
        assert_eq!(source.name(), "env:HOTSWAP*");
    }

    #[test]
    fn test_with_priority() {
        let source = EnvSource::new("HOTSWAP", "__").with_priority(400);
        assert_eq!(source.priority(), 400);
    }

    #[test]
    fn test_load_without_matching_vars() {
        let source = EnvSource::new("HOTSWAP_HANDLERS_TEST_UNSET_PREFIX", "__");
        let values = source.load().unwrap();
        assert!(values.is_empty());
    }
}
