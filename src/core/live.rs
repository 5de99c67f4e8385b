//! Atomically published configuration with reload and change notification.

use super::SettingsLoader;
use crate::error::{ReloadError, Result, ValidationError};
use crate::notify::{SubscriberRegistry, SubscriptionHandle};
use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Type alias for validator functions.
pub type Validator<T> = Arc<dyn Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync>;

/// A configuration value that can be replaced while readers hold the old one.
///
/// Reads are lock-free (`arc-swap`); a reload loads every source, validates
/// the result and only then publishes it, so readers always see either the
/// previous or the new configuration in full. Subscribers are told about
/// each published value.
///
/// # Examples
///
/// ```rust
/// use hotswap_handlers::core::{LiveConfig, ServiceConfig};
///
/// let live = LiveConfig::new(ServiceConfig::default());
/// let _handle = live.subscribe(|cfg: &ServiceConfig| println!("port {}", cfg.server.port));
///
/// let mut next = ServiceConfig::clone(&live.get());
/// next.server.port = 9000;
/// live.update(next).unwrap();
/// assert_eq!(live.get().server.port, 9000);
/// ```
pub struct LiveConfig<T> {
    current: Arc<ArcSwap<T>>,
    loader: Option<Arc<SettingsLoader>>,
    validator: Option<Validator<T>>,
    subscribers: SubscriberRegistry<T>,
}

impl<T: Send + Sync + 'static> LiveConfig<T> {
    /// A live value with no loader; only [`update`](Self::update) can change it.
    pub fn new(initial: T) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            loader: None,
            validator: None,
            subscribers: SubscriberRegistry::new(),
        }
    }

    /// A live value that [`reload`](Self::reload)s from `loader`.
    pub fn with_loader(initial: T, loader: SettingsLoader, validator: Option<Validator<T>>) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            loader: Some(Arc::new(loader)),
            validator,
            subscribers: SubscriberRegistry::new(),
        }
    }

    /// The current value.
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Whether this value has sources to reload from.
    pub fn can_reload(&self) -> bool {
        self.loader.is_some()
    }

    fn publish(&self, next: T) -> Result<Arc<T>> {
        if let Some(validator) = &self.validator {
            validator(&next)?;
        }

        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        self.subscribers.notify_all(&next);
        Ok(next)
    }

    /// Re-read every source, validate and publish.
    ///
    /// This performs blocking file IO; call it from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns an error if no loader is configured, a source fails, or
    /// validation rejects the new value. The previous value stays live.
    pub fn reload(&self) -> Result<Arc<T>>
    where
        T: DeserializeOwned,
    {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| ReloadError::Config("no settings sources to reload from".to_string()))?;

        let next: T = loader.load()?;
        self.publish(next)
    }

    /// Validate and publish `next` directly.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn update(&self, next: T) -> Result<()> {
        self.publish(next).map(|_| ())
    }

    /// Be told about every newly published value until the handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }
}

impl<T> Clone for LiveConfig<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
            loader: self.loader.clone(),
            validator: self.validator.clone(),
            subscribers: self.subscribers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ServiceConfig, Validate};
    use crate::sources::FileSource;
    use std::fs;
    use std::sync::atomic::{AtomicU16, Ordering};
    use tempfile::TempDir;

    fn file_backed(path: &std::path::Path) -> LiveConfig<ServiceConfig> {
        let mut loader = SettingsLoader::new();
        loader.add_source(Box::new(FileSource::new(path)));
        let initial: ServiceConfig = loader.load().unwrap();
        let validator: Validator<ServiceConfig> = Arc::new(|cfg: &ServiceConfig| cfg.validate());
        LiveConfig::with_loader(initial, loader, Some(validator))
    }

    #[test]
    fn test_reload_publishes_and_notifies() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("service.toml");
        fs::write(&path, "[server]\nport = 8080\n").unwrap();

        let live = file_backed(&path);
        let seen = Arc::new(AtomicU16::new(0));
        let seen_clone = Arc::clone(&seen);
        let _handle = live.subscribe(move |cfg| seen_clone.store(cfg.server.port, Ordering::SeqCst));

        fs::write(&path, "[server]\nport = 9090\n").unwrap();
        let published = live.reload().unwrap();

        assert_eq!(published.server.port, 9090);
        assert_eq!(live.get().server.port, 9090);
        assert_eq!(seen.load(Ordering::SeqCst), 9090);
    }

    #[test]
    fn test_invalid_reload_keeps_previous() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("service.toml");
        fs::write(&path, "[reload]\nworkers = 2\n").unwrap();

        let live = file_backed(&path);
        fs::write(&path, "[reload]\nworkers = 0\n").unwrap();

        assert!(matches!(live.reload(), Err(ReloadError::Validation(_))));
        assert_eq!(live.get().reload.workers, 2);
    }

    #[test]
    fn test_reload_without_loader() {
        let live = LiveConfig::new(ServiceConfig::default());
        assert!(!live.can_reload());
        assert!(live.reload().is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let live = LiveConfig::new(1u32);
        let other = live.clone();
        live.update(2).unwrap();
        assert_eq!(*other.get(), 2);
    }
}
