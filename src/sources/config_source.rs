//! Configuration source trait.

use crate::error::Result;
use std::collections::HashMap;

/// Raw top-level key/value map produced by a source.
pub type SourceValues = HashMap<String, config::Value>;

/// A layer of service configuration.
///
/// Sources are read on every configuration reload, so implementations should
/// re-read their backing store each time [`ConfigSource::load`] is called
/// rather than caching.
pub trait ConfigSource: Send + Sync {
    /// Load configuration as a raw key-value map.
    ///
    /// The returned map will be merged with other sources according to priority.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or parsed.
    fn load(&self) -> Result<SourceValues>;

    /// Human-readable name for logs and error messages.
    fn name(&self) -> String;

    /// Priority of this source (higher = takes precedence).
    ///
    /// Default priorities:
    /// - Environment variables: 300
    /// - Configuration file: 100
    fn priority(&self) -> i32 {
        100
    }
}
