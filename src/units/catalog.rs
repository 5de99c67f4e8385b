//! Native callables that unit manifests bind to.

use crate::error::HandlerError;
use crate::registry::{Handler, HandlerResult, Params};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Table of named callables available to manifests.
///
/// Built once at startup and shared with the loader. A manifest handler with
/// `action = "name"` is backed by the catalog entry of that name; editing the
/// manifest can rebind, rename or remove handlers at runtime, but the set of
/// callables is fixed when the process starts.
///
/// # Examples
///
/// ```rust
/// use hotswap_handlers::units::HandlerCatalog;
/// use serde_json::json;
///
/// let catalog = HandlerCatalog::with_builtins()
///     .with_sync("add", |params| {
///         let a = params.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
///         let b = params.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
///         Ok(json!(a + b))
///     });
///
/// assert!(catalog.get("add").is_some());
/// assert!(catalog.get("echo").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HandlerCatalog {
    entries: HashMap<String, Handler>,
}

impl HandlerCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding `echo`, `hello` and `async_hello`.
    pub fn with_builtins() -> Self {
        Self::new()
            .with_sync("echo", |params| Ok(Value::Object(params)))
            .with_sync("hello", hello)
            .with_suspending("async_hello", async_hello)
    }

    /// Add a synchronous callable.
    pub fn with_sync<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Params) -> HandlerResult + Send + Sync + 'static,
    {
        self.insert(name, Handler::sync(f));
        self
    }

    /// Add an async callable.
    pub fn with_suspending<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert(name, Handler::suspending(f));
        self
    }

    /// Add or replace a callable.
    pub fn insert(&mut self, name: impl Into<String>, handler: Handler) {
        self.entries.insert(name.into(), handler);
    }

    /// The callable registered as `name`.
    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.entries.get(name)
    }

    /// All callable names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

fn name_param(params: &Params) -> &str {
    params.get("name").and_then(Value::as_str).unwrap_or("World")
}

fn hello(params: Params) -> HandlerResult {
    Ok(json!({
        "message": format!("Hello, {}!", name_param(&params)),
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "type": "synchronous",
    }))
}

async fn async_hello(params: Params) -> HandlerResult {
    let delay = params.get("delay").and_then(Value::as_f64).unwrap_or(0.0);
    if !delay.is_finite() || delay < 0.0 {
        return Err(HandlerError::InvalidParams(format!("delay must be >= 0, got {}", delay)));
    }
    tokio::time::sleep(Duration::from_secs_f64(delay)).await;

    Ok(json!({
        "message": format!("Hello, {}!", name_param(&params)),
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "type": "asynchronous",
    }))
}
