//! The hot-reload service: lifecycle owner for registry, loader and reloads.

use super::{HotReloadServiceBuilder, LiveConfig, ServiceConfig, TokenSet};
use crate::error::{ReloadError, Result};
use crate::notify::{EventSink, LifecycleEvent, SubscriptionHandle};
use crate::registry::{HandlerResult, Method, Params, Registry};
use crate::reload::{ReloadCoordinator, SchedulerBridge, ScheduleOutcome, UnitStatus, WorkerPool};
use crate::units::{FileUnitLoader, ReloadSummary};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[cfg(feature = "file-watch")]
use crate::notify::{ChangeHandler, ChangeKind, UnitWatcher};

/// Owns every moving part of the hot-reload pipeline.
///
/// Built with [`HotReloadService::builder`]. [`start`](Self::start) loads
/// every unit, starts the scheduler bridge and the reload coordinator, and
/// begins watching when hot reload is enabled. The request-serving layer
/// reads through [`registry`](Self::registry) or [`invoke`](Self::invoke).
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_handlers::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let service = HotReloadService::builder()
///     .with_config_file("service.toml")
///     .with_env_overrides("HOTSWAP", "__")
///     .build()
///     .await?;
///
/// let summary = service.start().await?;
/// println!("{} handlers from {} units", summary.handler_count(), summary.loaded.len());
///
/// let out = service
///     .invoke("greet", "hello", Method::Get, Params::new())
///     .await?;
/// println!("{:?}", out);
///
/// service.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct HotReloadService {
    pub(super) config: LiveConfig<ServiceConfig>,
    pub(super) config_path: Option<PathBuf>,
    pub(super) units_dir: PathBuf,
    pub(super) hot_reload: bool,
    pub(super) registry: Registry,
    pub(super) tokens: TokenSet,
    pub(super) loader: Arc<FileUnitLoader>,
    pub(super) pool: Arc<WorkerPool>,
    pub(super) coordinator: ReloadCoordinator,
    pub(super) bridge: SchedulerBridge,
    pub(super) sink: Arc<dyn EventSink>,
    pub(super) subscriptions: Vec<SubscriptionHandle>,
    pub(super) started: AtomicBool,
    pub(super) tasks: Mutex<Vec<JoinHandle<()>>>,
    #[cfg(feature = "file-watch")]
    pub(super) watcher: Mutex<Option<UnitWatcher>>,
}

impl HotReloadService {
    /// Start configuring a service.
    pub fn builder() -> HotReloadServiceBuilder {
        HotReloadServiceBuilder::new()
    }

    /// Load every unit and start reload processing.
    ///
    /// Creates the unit directory if it does not exist. Units that fail to
    /// load are listed in the summary; they do not stop startup.
    ///
    /// # Errors
    ///
    /// Fails if the service was already started, the unit directory cannot
    /// be created or read, or the watcher cannot start.
    pub async fn start(&self) -> Result<ReloadSummary> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ReloadError::Config("service already started".to_string()));
        }

        let loader = Arc::clone(&self.loader);
        let summary = self
            .pool
            .run(move || -> Result<ReloadSummary> {
                std::fs::create_dir_all(loader.dir())?;
                loader.load_all()
            })
            .await??;

        let runner = self.bridge.attach();
        let coordinator = self.coordinator.clone();
        {
            let mut tasks = self.tasks.lock();
            tasks.push(tokio::spawn(runner.run()));
            tasks.push(tokio::spawn(async move { coordinator.run().await }));
        }

        if self.hot_reload {
            self.start_watching()?;
        }

        let config = self.config.get();
        info!(
            host = %config.server.host,
            port = config.server.port,
            units = summary.loaded.len(),
            failed = summary.failed.len(),
            hot_reload = self.hot_reload,
            "Service started"
        );
        self.sink.emit(&LifecycleEvent::ServerStarted {
            host: config.server.host.clone(),
            port: config.server.port,
            hot_reload: self.hot_reload,
            endpoints_count: self.registry.handler_count(),
        });
        Ok(summary)
    }

    #[cfg(feature = "file-watch")]
    fn start_watching(&self) -> Result<()> {
        let forwarder = WatchForwarder {
            bridge: self.bridge.clone(),
            coordinator: self.coordinator.clone(),
            sink: Arc::clone(&self.sink),
        };
        let watcher = UnitWatcher::start(
            &self.units_dir,
            self.config_path.as_deref(),
            &self.config.get().units.reserved_prefix,
            Arc::new(forwarder),
        )?;
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    #[cfg(not(feature = "file-watch"))]
    fn start_watching(&self) -> Result<()> {
        warn!("Hot reload requested but the `file-watch` feature is disabled");
        Ok(())
    }

    /// Stop watching, stop accepting reloads and wait for running ones.
    pub async fn shutdown(&self) {
        self.sink.emit(&LifecycleEvent::ServerShutdown);

        #[cfg(feature = "file-watch")]
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }

        self.bridge.detach();
        self.coordinator.shutdown().await;

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Service stopped");
    }

    /// Clear the registry and load every unit again.
    ///
    /// # Errors
    ///
    /// Fails if the unit directory cannot be read or the pool is shut down.
    pub async fn reload_all(&self) -> Result<ReloadSummary> {
        let loader = Arc::clone(&self.loader);
        self.pool.run(move || loader.reload_all()).await?
    }

    /// Re-read the configuration sources and apply them.
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be read or the new settings are invalid;
    /// the previous configuration stays active.
    pub async fn reload_config(&self) -> Result<Arc<ServiceConfig>> {
        self.coordinator.reload_config().await?;
        Ok(self.config.get())
    }

    /// Request a debounced reload of one unit.
    pub fn schedule_reload(&self, unit: &str) -> ScheduleOutcome {
        self.coordinator.schedule_reload(unit)
    }

    /// Check that `token` grants administrative access.
    ///
    /// # Errors
    ///
    /// [`ReloadError::Unauthorized`] for any other token.
    pub fn authorize_admin(&self, token: &str) -> Result<()> {
        self.tokens.authorize_admin(token)
    }

    /// Resolve and call a handler with raw request parameters.
    ///
    /// The outer error is a routing failure (not found, method not allowed);
    /// the inner result is the handler's own outcome.
    ///
    /// # Errors
    ///
    /// [`ReloadError::NotFound`] or [`ReloadError::MethodNotAllowed`].
    pub async fn invoke(
        &self,
        unit: &str,
        handler: &str,
        method: Method,
        params: Params,
    ) -> Result<HandlerResult> {
        let descriptor = self.registry.resolve(unit, handler, method)?;
        Ok(descriptor.invoke(params).await)
    }

    /// The shared handler registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The active configuration.
    pub fn config(&self) -> Arc<ServiceConfig> {
        self.config.get()
    }

    /// The live configuration handle, for subscribing to changes.
    pub fn live_config(&self) -> &LiveConfig<ServiceConfig> {
        &self.config
    }

    /// The live token sets.
    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    /// The reload coordinator.
    pub fn coordinator(&self) -> &ReloadCoordinator {
        &self.coordinator
    }

    /// Last reload status of `unit`.
    pub fn status(&self, unit: &str) -> Option<UnitStatus> {
        self.coordinator.status(unit)
    }

    /// The unit directory.
    pub fn units_dir(&self) -> &Path {
        &self.units_dir
    }

    /// Whether file watching is active.
    #[cfg(feature = "file-watch")]
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().as_ref().is_some_and(UnitWatcher::is_running)
    }

    /// Whether file watching is active.
    #[cfg(not(feature = "file-watch"))]
    pub fn is_watching(&self) -> bool {
        false
    }

    /// Number of live configuration subscriptions held by the service.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(feature = "file-watch")]
struct WatchForwarder {
    bridge: SchedulerBridge,
    coordinator: ReloadCoordinator,
    sink: Arc<dyn EventSink>,
}

#[cfg(feature = "file-watch")]
impl ChangeHandler for WatchForwarder {
    fn on_unit_changed(&self, unit: &str, path: &Path, kind: ChangeKind) {
        let (unit, file_path) = (unit.to_string(), path.to_path_buf());
        let event = match kind {
            ChangeKind::Created => LifecycleEvent::FileCreated {
                unit: unit.clone(),
                file_path,
            },
            ChangeKind::Modified => LifecycleEvent::FileModified {
                unit: unit.clone(),
                file_path,
            },
            ChangeKind::Deleted => LifecycleEvent::FileDeleted {
                unit: unit.clone(),
                file_path,
            },
        };
        self.sink.emit(&event);

        let coordinator = self.coordinator.clone();
        let _ = self.bridge.submit(async move {
            coordinator.schedule_reload(&unit);
        });
    }

    fn on_config_changed(&self, path: &Path) {
        self.sink.emit(&LifecycleEvent::ConfigModified {
            file_path: path.to_path_buf(),
        });

        let coordinator = self.coordinator.clone();
        let _ = self.bridge.submit(async move {
            let _ = coordinator.reload_config().await;
        });
    }
}
