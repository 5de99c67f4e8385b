//! Structured lifecycle events emitted by the registry, watcher, loader and service.

use serde::Serialize;
use std::path::PathBuf;

/// A structured event describing a change in the handler lifecycle.
///
/// Events serialize to a flat JSON object tagged with their upper-case name,
/// e.g. `{"event":"FUNCTIONS_CLEARED","unit":"greet","function_count":2,...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEvent {
    /// A handler was published into the registry.
    FunctionRegistered {
        /// Owning unit
        unit: String,
        /// Handler name
        function_name: String,
        /// Route the handler is reachable under
        endpoint: String,
        /// Accepted HTTP methods
        supported_methods: Vec<String>,
    },
    /// All handlers of a unit were removed.
    FunctionsCleared {
        /// Cleared unit
        unit: String,
        /// Number of handlers removed
        function_count: usize,
        /// Names of the removed handlers
        function_names: Vec<String>,
    },
    /// A clear was requested for a unit with no registrations.
    ClearFailed {
        /// Requested unit
        unit: String,
        /// Why nothing was cleared
        reason: String,
    },
    /// The whole registry was emptied.
    AllFunctionsCleared {
        /// Number of units removed
        unit_count: usize,
    },
    /// A unit source artifact appeared.
    FileCreated {
        /// Unit name derived from the file stem
        unit: String,
        /// Path reported by the watcher
        file_path: PathBuf,
    },
    /// A unit source artifact changed.
    FileModified {
        /// Unit name derived from the file stem
        unit: String,
        /// Path reported by the watcher
        file_path: PathBuf,
    },
    /// A unit source artifact was removed.
    FileDeleted {
        /// Unit name derived from the file stem
        unit: String,
        /// Path reported by the watcher
        file_path: PathBuf,
    },
    /// The configuration artifact changed on disk.
    ConfigModified {
        /// Path reported by the watcher
        file_path: PathBuf,
    },
    /// A new configuration was applied.
    ConfigReloaded {
        /// Effective bind host
        host: String,
        /// Effective bind port
        port: u16,
        /// Whether file watching is enabled
        hot_reload: bool,
        /// Effective log filter
        log_level: String,
        /// Effective debounce interval in milliseconds
        debounce_ms: u64,
    },
    /// A unit failed to load; its previous registration is kept.
    UnitLoadFailed {
        /// Unit that failed
        unit: String,
        /// Failure cause
        reason: String,
    },
    /// The service finished startup.
    ServerStarted {
        /// Bind host
        host: String,
        /// Bind port
        port: u16,
        /// Whether file watching is enabled
        hot_reload: bool,
        /// Number of registered handlers after startup enumeration
        endpoints_count: usize,
    },
    /// The service began shutting down.
    ServerShutdown,
}

impl LifecycleEvent {
    /// Stable upper-case event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FunctionRegistered { .. } => "FUNCTION_REGISTERED",
            Self::FunctionsCleared { .. } => "FUNCTIONS_CLEARED",
            Self::ClearFailed { .. } => "CLEAR_FAILED",
            Self::AllFunctionsCleared { .. } => "ALL_FUNCTIONS_CLEARED",
            Self::FileCreated { .. } => "FILE_CREATED",
            Self::FileModified { .. } => "FILE_MODIFIED",
            Self::FileDeleted { .. } => "FILE_DELETED",
            Self::ConfigModified { .. } => "CONFIG_MODIFIED",
            Self::ConfigReloaded { .. } => "CONFIG_RELOADED",
            Self::UnitLoadFailed { .. } => "UNIT_LOAD_FAILED",
            Self::ServerStarted { .. } => "SERVER_STARTED",
            Self::ServerShutdown => "SERVER_SHUTDOWN",
        }
    }

    /// The unit this event concerns, if it is unit-scoped.
    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::FunctionRegistered { unit, .. }
            | Self::FunctionsCleared { unit, .. }
            | Self::ClearFailed { unit, .. }
            | Self::FileCreated { unit, .. }
            | Self::FileModified { unit, .. }
            | Self::FileDeleted { unit, .. }
            | Self::UnitLoadFailed { unit, .. } => Some(unit),
            _ => None,
        }
    }
}

/// Consumer of lifecycle events.
///
/// Implementations must be cheap and non-blocking: events are emitted from
/// registry writers, worker threads and the watcher thread.
pub trait EventSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: &LifecycleEvent);
}

impl<F> EventSink for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn emit(&self, event: &LifecycleEvent) {
        self(event)
    }
}

/// Event sink that writes every event through `tracing`.
///
/// Unit-scoped events are logged as `MODULE`, the rest as `SYSTEM`, with the
/// JSON-encoded event attached as the `details` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LifecycleEvent) {
        let details = serde_json::to_string(event).unwrap_or_default();
        match (event, event.unit()) {
            (LifecycleEvent::UnitLoadFailed { .. }, Some(unit)) => {
                tracing::warn!(target: "hotswap_handlers::events", event = event.name(), unit, %details, "MODULE");
            }
            (_, Some(unit)) => {
                tracing::info!(target: "hotswap_handlers::events", event = event.name(), unit, %details, "MODULE");
            }
            (_, None) => {
                tracing::info!(target: "hotswap_handlers::events", event = event.name(), %details, "SYSTEM");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_serializes_with_upper_case_tag() {
        let event = LifecycleEvent::FunctionsCleared {
            unit: "greet".to_string(),
            function_count: 2,
            function_names: vec!["hello".to_string(), "bye".to_string()],
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "FUNCTIONS_CLEARED");
        assert_eq!(json["unit"], "greet");
        assert_eq!(json["function_count"], 2);
        assert_eq!(event.name(), "FUNCTIONS_CLEARED");
    }

    #[test]
    fn test_unit_scope() {
        let scoped = LifecycleEvent::FileDeleted {
            unit: "greet".to_string(),
            file_path: PathBuf::from("apis/greet.toml"),
        };
        assert_eq!(scoped.unit(), Some("greet"));
        assert_eq!(LifecycleEvent::ServerShutdown.unit(), None);
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = move |event: &LifecycleEvent| {
            seen_clone.lock().unwrap().push(event.name());
        };

        sink.emit(&LifecycleEvent::ServerShutdown);
        TracingSink.emit(&LifecycleEvent::ServerShutdown);

        assert_eq!(*seen.lock().unwrap(), vec!["SERVER_SHUTDOWN"]);
    }
}
