//! The shared handler registry.

use super::descriptor::{HandlerDescriptor, Method};
use crate::error::{ReloadError, Result};
use crate::notify::{EventSink, LifecycleEvent};
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Handlers of one unit, keyed by handler name.
pub type UnitHandlers = HashMap<String, Arc<HandlerDescriptor>>;

/// Immutable point-in-time view of the whole registry.
pub type RegistrySnapshot = Arc<HashMap<String, Arc<UnitHandlers>>>;

/// Outcome of [`Registry::clear_unit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The unit's handlers were removed.
    Cleared {
        /// Names of the removed handlers, sorted
        handlers: Vec<String>,
    },
    /// The unit had no registrations.
    NothingToClear,
}

impl ClearOutcome {
    /// Number of handlers removed.
    pub fn count(&self) -> usize {
        match self {
            Self::Cleared { handlers } => handlers.len(),
            Self::NothingToClear => 0,
        }
    }
}

struct RegistryInner {
    table: ArcSwap<HashMap<String, Arc<UnitHandlers>>>,
    write_lock: Mutex<()>,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
}

/// Concurrent map from `(unit, handler)` to [`HandlerDescriptor`].
///
/// Readers load the current table through `arc-swap` and never block. Writers
/// are serialized, copy the table, and publish the new version in one store,
/// so every snapshot a reader sees is a consistent point in time and a unit's
/// handler set is never observed half-replaced.
///
/// The registry is a cheap cloneable handle; construct one per process (or
/// per test) and pass it to every consumer.
///
/// # Examples
///
/// ```rust
/// use hotswap_handlers::registry::{Handler, HandlerDescriptor, MethodSet, Registry};
/// use serde_json::json;
///
/// let registry = Registry::new();
/// registry.register(
///     "greet",
///     "hello",
///     HandlerDescriptor::new(Handler::respond(json!("hi"))).with_methods(MethodSet::GET_AND_POST),
/// );
///
/// assert!(registry.get("greet", "hello").is_some());
/// assert!(registry.supports("greet", "hello", "GET"));
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Create an empty registry with no event sink.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                table: ArcSwap::from_pointee(HashMap::new()),
                write_lock: Mutex::new(()),
                sink: RwLock::new(None),
            }),
        }
    }

    /// Create an empty registry that reports mutations to `sink`.
    pub fn with_event_sink(sink: Arc<dyn EventSink>) -> Self {
        let registry = Self::new();
        registry.set_event_sink(Some(sink));
        registry
    }

    /// Attach or detach the event sink.
    pub fn set_event_sink(&self, sink: Option<Arc<dyn EventSink>>) {
        *self.inner.sink.write() = sink;
    }

    fn emit_all(&self, events: Vec<LifecycleEvent>) {
        let sink = self.inner.sink.read().clone();
        if let Some(sink) = sink {
            for event in &events {
                sink.emit(event);
            }
        }
    }

    /// Apply `f` to a private copy of the table and publish the result.
    fn mutate<R>(&self, f: impl FnOnce(&mut HashMap<String, Arc<UnitHandlers>>) -> R) -> R {
        let _guard = self.inner.write_lock.lock();
        let mut table = HashMap::clone(&self.inner.table.load());
        let result = f(&mut table);
        self.inner.table.store(Arc::new(table));
        result
    }

    /// Register `descriptor` under `(unit, handler)`, replacing any existing entry.
    pub fn register(&self, unit: &str, handler: &str, descriptor: HandlerDescriptor) {
        let methods = descriptor.methods;
        let descriptor = Arc::new(descriptor);
        self.mutate(|table| {
            let mut handlers = table
                .get(unit)
                .map(|existing| UnitHandlers::clone(existing))
                .unwrap_or_default();
            handlers.insert(handler.to_string(), descriptor);
            table.insert(unit.to_string(), Arc::new(handlers));
        });

        self.emit_all(vec![registered_event(unit, handler, methods.names())]);
    }

    /// Atomically replace every handler of `unit` with `handlers`.
    ///
    /// Readers see either the complete old set or the complete new set. An
    /// empty `handlers` list leaves the unit unregistered.
    pub fn replace_unit(&self, unit: &str, handlers: Vec<(String, HandlerDescriptor)>) -> ClearOutcome {
        let mut registered: Vec<(String, Vec<String>)> = handlers
            .iter()
            .map(|(name, d)| (name.clone(), d.methods.names()))
            .collect();
        registered.sort();

        let fresh: UnitHandlers = handlers
            .into_iter()
            .map(|(name, descriptor)| (name, Arc::new(descriptor)))
            .collect();

        let previous = self.mutate(|table| {
            let previous = if fresh.is_empty() {
                table.remove(unit)
            } else {
                table.insert(unit.to_string(), Arc::new(fresh))
            };
            previous.map(|old| sorted_names(&old))
        });

        let mut events = Vec::with_capacity(registered.len() + 1);
        let outcome = match previous {
            Some(names) => {
                events.push(LifecycleEvent::FunctionsCleared {
                    unit: unit.to_string(),
                    function_count: names.len(),
                    function_names: names.clone(),
                });
                ClearOutcome::Cleared { handlers: names }
            }
            None => ClearOutcome::NothingToClear,
        };
        events.extend(
            registered
                .into_iter()
                .map(|(name, methods)| registered_event(unit, &name, methods)),
        );
        self.emit_all(events);

        outcome
    }

    /// Look up a handler.
    pub fn get(&self, unit: &str, handler: &str) -> Option<Arc<HandlerDescriptor>> {
        self.inner
            .table
            .load()
            .get(unit)
            .and_then(|handlers| handlers.get(handler))
            .cloned()
    }

    /// Whether `(unit, handler)` exists and accepts `method` (case-insensitive).
    pub fn supports(&self, unit: &str, handler: &str, method: &str) -> bool {
        let Ok(method) = method.parse::<Method>() else {
            return false;
        };
        self.get(unit, handler)
            .is_some_and(|descriptor| descriptor.methods.allows(method))
    }

    /// Look up a handler for a request with `method`.
    ///
    /// # Errors
    ///
    /// [`ReloadError::NotFound`] when the unit or handler is not registered
    /// (including while it is being reloaded or after removal), and
    /// [`ReloadError::MethodNotAllowed`] when it does not accept `method`.
    pub fn resolve(&self, unit: &str, handler: &str, method: Method) -> Result<Arc<HandlerDescriptor>> {
        let descriptor = self
            .get(unit, handler)
            .ok_or_else(|| ReloadError::not_found(unit, handler))?;
        if !descriptor.methods.allows(method) {
            return Err(ReloadError::MethodNotAllowed {
                unit: unit.to_string(),
                handler: handler.to_string(),
                method: method.to_string(),
            });
        }
        Ok(descriptor)
    }

    /// Remove every handler of `unit`.
    pub fn clear_unit(&self, unit: &str) -> ClearOutcome {
        let removed = self.mutate(|table| table.remove(unit));

        match removed {
            Some(handlers) => {
                let names = sorted_names(&handlers);
                self.emit_all(vec![LifecycleEvent::FunctionsCleared {
                    unit: unit.to_string(),
                    function_count: names.len(),
                    function_names: names.clone(),
                }]);
                ClearOutcome::Cleared { handlers: names }
            }
            None => {
                self.emit_all(vec![LifecycleEvent::ClearFailed {
                    unit: unit.to_string(),
                    reason: "module_not_found".to_string(),
                }]);
                ClearOutcome::NothingToClear
            }
        }
    }

    /// Remove every handler of every unit.
    pub fn clear_all(&self) {
        let unit_count = self.mutate(|table| {
            let count = table.len();
            table.clear();
            count
        });
        self.emit_all(vec![LifecycleEvent::AllFunctionsCleared { unit_count }]);
    }

    /// Consistent snapshot of the whole registry.
    pub fn list_all(&self) -> RegistrySnapshot {
        self.inner.table.load_full()
    }

    /// Registered unit names, sorted.
    pub fn units(&self) -> Vec<String> {
        let mut units: Vec<String> = self.inner.table.load().keys().cloned().collect();
        units.sort();
        units
    }

    /// Total number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.inner.table.load().values().map(|h| h.len()).sum()
    }

    /// Every `METHOD /unit/handler` route, sorted.
    pub fn endpoints(&self) -> Vec<String> {
        let snapshot = self.list_all();
        let mut endpoints: Vec<String> = snapshot
            .iter()
            .flat_map(|(unit, handlers)| {
                handlers.iter().flat_map(move |(name, descriptor)| {
                    descriptor
                        .methods
                        .names()
                        .into_iter()
                        .map(move |method| format!("{} /{}/{}", method, unit, name))
                })
            })
            .collect();
        endpoints.sort();
        endpoints
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_names(handlers: &UnitHandlers) -> Vec<String> {
    let mut names: Vec<String> = handlers.keys().cloned().collect();
    names.sort();
    names
}

fn registered_event(unit: &str, handler: &str, methods: Vec<String>) -> LifecycleEvent {
    LifecycleEvent::FunctionRegistered {
        unit: unit.to_string(),
        function_name: handler.to_string(),
        endpoint: format!("/{}/{}", unit, handler),
        supported_methods: methods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Handler, MethodSet};
    use serde_json::json;

    fn descriptor(value: &str) -> HandlerDescriptor {
        HandlerDescriptor::new(Handler::respond(json!(value)))
    }

    fn recording_registry() -> (Registry, Arc<Mutex<Vec<LifecycleEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let sink: Arc<dyn EventSink> = Arc::new(move |event: &LifecycleEvent| {
            events_clone.lock().push(event.clone());
        });
        (Registry::with_event_sink(sink), events)
    }

    #[test]
    fn test_register_and_get() {
        let registry = Registry::new();
        registry.register(
            "greet",
            "hello",
            descriptor("hi").with_methods(MethodSet::GET_AND_POST),
        );

        assert!(registry.get("greet", "hello").is_some());
        assert!(registry.supports("greet", "hello", "GET"));
        assert!(registry.supports("greet", "hello", "post"));
        assert!(!registry.supports("greet", "hello", "DELETE"));
        assert!(registry.get("greet", "missing").is_none());
    }

    #[test]
    fn test_default_is_post_only() {
        let registry = Registry::new();
        registry.register("greet", "hello", descriptor("hi"));

        assert!(!registry.supports("greet", "hello", "GET"));
        assert!(registry.supports("greet", "hello", "POST"));
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let registry = Registry::new();
        registry.register("greet", "hello", descriptor("first"));
        registry.register("greet", "hello", descriptor("second"));

        let d = registry.get("greet", "hello").unwrap();
        assert_eq!(d.handler.invoke(Default::default()).await.unwrap(), json!("second"));
        assert_eq!(registry.handler_count(), 1);
    }

    #[test]
    fn test_clear_unit() {
        let (registry, events) = recording_registry();
        registry.register("greet", "hello", descriptor("hi"));
        registry.register("greet", "bye", descriptor("bye"));
        registry.register("other", "x", descriptor("x"));

        let outcome = registry.clear_unit("greet");
        assert_eq!(
            outcome,
            ClearOutcome::Cleared {
                handlers: vec!["bye".to_string(), "hello".to_string()]
            }
        );
        assert!(registry.get("greet", "hello").is_none());
        assert!(registry.get("other", "x").is_some());

        let last = events.lock().last().cloned().unwrap();
        assert_eq!(last.name(), "FUNCTIONS_CLEARED");
    }

    #[test]
    fn test_clear_unknown_unit_is_noop() {
        let (registry, events) = recording_registry();

        assert_eq!(registry.clear_unit("ghost"), ClearOutcome::NothingToClear);
        assert_eq!(registry.clear_unit("ghost"), ClearOutcome::NothingToClear);

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.name() == "CLEAR_FAILED"));
    }

    #[test]
    fn test_replace_unit_swaps_whole_set() {
        let (registry, events) = recording_registry();
        registry.register("greet", "hello", descriptor("hi"));
        registry.register("greet", "old", descriptor("old"));
        events.lock().clear();

        let outcome = registry.replace_unit(
            "greet",
            vec![
                ("hello".to_string(), descriptor("hi2")),
                ("new".to_string(), descriptor("new")),
            ],
        );

        assert_eq!(outcome.count(), 2);
        assert!(registry.get("greet", "old").is_none());
        assert!(registry.get("greet", "new").is_some());

        let names: Vec<&str> = events.lock().iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["FUNCTIONS_CLEARED", "FUNCTION_REGISTERED", "FUNCTION_REGISTERED"]
        );
    }

    #[test]
    fn test_replace_with_empty_unregisters() {
        let registry = Registry::new();
        registry.register("greet", "hello", descriptor("hi"));
        registry.replace_unit("greet", Vec::new());
        assert!(registry.units().is_empty());
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let registry = Registry::new();
        registry.register("greet", "hello", descriptor("hi"));
        let snapshot = registry.list_all();

        registry.clear_all();

        assert!(snapshot.get("greet").is_some());
        assert!(registry.list_all().is_empty());
    }

    #[test]
    fn test_resolve() {
        let registry = Registry::new();
        registry.register("greet", "hello", descriptor("hi"));

        assert!(registry.resolve("greet", "hello", Method::Post).is_ok());
        assert!(matches!(
            registry.resolve("greet", "hello", Method::Get),
            Err(ReloadError::MethodNotAllowed { .. })
        ));
        assert!(registry.resolve("greet", "nope", Method::Post).unwrap_err().is_not_found());
    }

    #[test]
    fn test_endpoints() {
        let registry = Registry::new();
        registry.register(
            "greet",
            "hello",
            descriptor("hi").with_methods(MethodSet::GET_AND_POST),
        );
        registry.register("math", "add", descriptor("3"));

        assert_eq!(
            registry.endpoints(),
            vec!["GET /greet/hello", "POST /greet/hello", "POST /math/add"]
        );
    }

    #[test]
    fn test_no_sink_is_legal() {
        let registry = Registry::new();
        registry.register("greet", "hello", descriptor("hi"));
        registry.clear_unit("greet");
        registry.clear_all();
        assert_eq!(registry.handler_count(), 0);
    }
}
