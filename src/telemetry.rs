//! Log output setup with a filter that follows configuration reloads.

use crate::core::LoggingSettings;
use crate::error::{ReloadError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

/// Handle to the installed log filter.
///
/// Pass it to the service builder so the filter is replaced whenever a new
/// configuration is applied.
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Replace the active filter with `settings.level`.
    ///
    /// # Errors
    ///
    /// [`ReloadError::Config`] if the directive does not parse or the
    /// subscriber is gone; the previous filter stays active.
    pub fn apply(&self, settings: &LoggingSettings) -> Result<()> {
        let filter = parse_filter(&settings.level)?;
        self.handle
            .reload(filter)
            .map_err(|e| ReloadError::Config(format!("Failed to swap log filter: {}", e)))
    }

    /// The active filter directive.
    pub fn current(&self) -> Option<String> {
        self.handle.with_current(|filter| filter.to_string()).ok()
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle").field("filter", &self.current()).finish()
    }
}

fn parse_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| ReloadError::Config(format!("Invalid log filter '{}': {}", level, e)))
}

/// Build the reloadable filter layer without installing it.
pub fn filter_layer(
    settings: &LoggingSettings,
) -> Result<(reload::Layer<EnvFilter, Registry>, LogHandle)> {
    let (layer, handle) = reload::Layer::new(parse_filter(&settings.level)?);
    Ok((layer, LogHandle { handle }))
}

/// Install the global subscriber: a reloadable filter over `fmt` output.
///
/// # Errors
///
/// [`ReloadError::Config`] if the level does not parse or a global
/// subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<LogHandle> {
    let (filter, handle) = filter_layer(settings)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| ReloadError::Config(format!("Failed to install logging: {}", e)))?;
    Ok(handle)
}
