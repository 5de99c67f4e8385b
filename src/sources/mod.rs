//! Configuration source implementations for the service settings.

mod config_source;
mod env;
mod file;

pub use config_source::{ConfigSource, SourceValues};
pub use env::EnvSource;
pub use file::{FileSource, SUPPORTED_EXTENSIONS, is_supported_extension};
