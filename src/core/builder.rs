//! Builder for constructing HotReloadService instances.

use super::{HotReloadService, LiveConfig, ServiceConfig, SettingsLoader, TokenSet, Validate, Validator};
use crate::error::Result;
#[cfg(feature = "metrics")]
use crate::metrics::ReloadMetrics;
use crate::notify::{EventSink, TracingSink};
use crate::registry::Registry;
use crate::reload::{ReloadCoordinator, SchedulerBridge, WorkerPool};
use crate::sources::{ConfigSource, EnvSource, FileSource};
use crate::telemetry::LogHandle;
use crate::units::{FileUnitLoader, HandlerCatalog, UnitLoader};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::warn;

/// Builder for a [`HotReloadService`].
///
/// Settings come from the configured sources (a settings file, then
/// environment overrides) or from [`with_config`](Self::with_config). The
/// `with_units_dir`, `with_debounce`, `with_workers` and `with_hot_reload`
/// overrides win over whatever the settings say; they are fixed for the
/// life of the service.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_handlers::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() -> Result<()> {
/// let service = HotReloadService::builder()
///     .with_config_file("service.toml")
///     .with_env_overrides("HOTSWAP", "__")
///     .with_units_dir("apis")
///     .with_debounce(Duration::from_millis(250))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct HotReloadServiceBuilder {
    config_file: Option<PathBuf>,
    env_prefix: Option<String>,
    env_separator: Option<String>,
    custom_sources: Vec<Box<dyn ConfigSource>>,
    config: Option<ServiceConfig>,
    units_dir: Option<PathBuf>,
    catalog: Option<HandlerCatalog>,
    sink: Option<Arc<dyn EventSink>>,
    debounce: Option<Duration>,
    workers: Option<usize>,
    hot_reload: Option<bool>,
    log_handle: Option<LogHandle>,
    #[cfg(feature = "metrics")]
    metrics: Option<ReloadMetrics>,
}

impl HotReloadServiceBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config_file: None,
            env_prefix: None,
            env_separator: None,
            custom_sources: Vec::new(),
            config: None,
            units_dir: None,
            catalog: None,
            sink: None,
            debounce: None,
            workers: None,
            hot_reload: None,
            log_handle: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Read settings from this file (YAML, TOML or JSON).
    ///
    /// The file may be missing at startup; defaults apply until it appears.
    /// With hot reload on, edits to it trigger a configuration reload.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Override settings from environment variables.
    ///
    /// With prefix `HOTSWAP` and separator `__`, `HOTSWAP__SERVER__PORT=9000`
    /// sets `server.port`. Environment overrides have the highest priority.
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.env_separator = Some(separator.to_string());
        self
    }

    /// Add a custom settings source.
    pub fn with_source<S: ConfigSource + 'static>(mut self, source: S) -> Self {
        self.custom_sources.push(Box::new(source));
        self
    }

    /// Start from this configuration instead of loading it.
    ///
    /// Configured sources are still used by later reloads.
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Directory holding unit manifests.
    pub fn with_units_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.units_dir = Some(dir.into());
        self
    }

    /// Callables available to manifests. Defaults to
    /// [`HandlerCatalog::with_builtins`].
    pub fn with_catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Where lifecycle events go. Defaults to [`TracingSink`].
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Quiet period before a unit reload starts.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    /// Number of blocking load workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Enable or disable file watching.
    pub fn with_hot_reload(mut self, enabled: bool) -> Self {
        self.hot_reload = Some(enabled);
        self
    }

    /// Swap the log filter whenever a new configuration is applied.
    pub fn with_log_handle(mut self, handle: LogHandle) -> Self {
        self.log_handle = Some(handle);
        self
    }

    /// Record reload metrics.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(ReloadMetrics::new(meter));
        self
    }

    /// Load and validate the settings and wire the service together.
    ///
    /// Nothing is loaded or watched until [`HotReloadService::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if a settings source cannot be read, the settings
    /// do not deserialize, or validation fails.
    pub async fn build(self) -> Result<HotReloadService> {
        let mut settings = SettingsLoader::new();
        if let Some(path) = &self.config_file {
            settings.add_source(Box::new(FileSource::new(path).optional()));
        }
        for source in self.custom_sources {
            settings.add_source(source);
        }
        if let (Some(prefix), Some(separator)) = (self.env_prefix, self.env_separator) {
            settings.add_source(Box::new(EnvSource::new(prefix, separator)));
        }

        let initial = match self.config {
            Some(config) => config,
            None => settings.load::<ServiceConfig>()?,
        };
        initial.validate()?;

        let units_dir = self.units_dir.unwrap_or_else(|| initial.units.dir.clone());
        let debounce = self.debounce.unwrap_or_else(|| initial.reload.debounce());
        let workers = self.workers.unwrap_or(initial.reload.workers);
        let hot_reload = self.hot_reload.unwrap_or(initial.units.hot_reload);
        let reserved_prefix = initial.units.reserved_prefix.clone();

        let sink: Arc<dyn EventSink> = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let tokens = TokenSet::new(&initial.auth);

        let config = if settings.is_empty() {
            LiveConfig::new(initial)
        } else {
            let validator: Validator<ServiceConfig> = Arc::new(|config: &ServiceConfig| config.validate());
            LiveConfig::with_loader(initial, settings, Some(validator))
        };

        let mut subscriptions = Vec::new();
        subscriptions.push(config.subscribe({
            let tokens = tokens.clone();
            move |config: &ServiceConfig| tokens.refresh(&config.auth)
        }));
        if let Some(handle) = self.log_handle {
            subscriptions.push(config.subscribe(move |config: &ServiceConfig| {
                if let Err(e) = handle.apply(&config.logging) {
                    warn!(error = %e, "Keeping previous log filter");
                }
            }));
        }

        let registry = Registry::with_event_sink(Arc::clone(&sink));
        let catalog = Arc::new(self.catalog.unwrap_or_else(HandlerCatalog::with_builtins));
        let loader = Arc::new(
            FileUnitLoader::new(units_dir.clone(), catalog, registry.clone())
                .with_reserved_prefix(reserved_prefix)
                .with_config(config.clone())
                .with_event_sink(Arc::clone(&sink)),
        );

        let pool = Arc::new(WorkerPool::new(workers));
        let unit_loader: Arc<dyn UnitLoader> = loader.clone();
        let coordinator = ReloadCoordinator::new(unit_loader, Arc::clone(&pool), debounce);
        #[cfg(feature = "metrics")]
        let coordinator = match self.metrics {
            Some(metrics) => coordinator.with_metrics(metrics),
            None => coordinator,
        };

        Ok(HotReloadService {
            config,
            config_path: self.config_file,
            units_dir,
            hot_reload,
            registry,
            tokens,
            loader,
            pool,
            coordinator,
            bridge: SchedulerBridge::new(),
            sink,
            subscriptions,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            #[cfg(feature = "file-watch")]
            watcher: Mutex::new(None),
        })
    }
}

impl Default for HotReloadServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
