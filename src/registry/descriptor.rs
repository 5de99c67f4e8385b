//! Handler callables and the descriptors published into the registry.

use super::params::{ParamSpec, Params, bind_params};
use crate::error::HandlerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

/// Result of invoking a handler.
pub type HandlerResult = Result<Value, HandlerError>;

/// Boxed future returned by suspension-capable handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

type SyncFn = dyn Fn(Params) -> HandlerResult + Send + Sync;
type SuspendingFn = dyn Fn(Params) -> HandlerFuture + Send + Sync;

/// A request-serving callable.
///
/// Handlers are either plain functions run inline on the caller's task, or
/// suspension-capable functions returning a future. Callers go through
/// [`Handler::invoke`] and never need to inspect which kind they hold.
#[derive(Clone)]
pub enum Handler {
    /// Runs to completion on the calling task.
    Sync(Arc<SyncFn>),
    /// Returns a future that is awaited by the caller.
    Suspending(Arc<SuspendingFn>),
}

impl Handler {
    /// Wrap a synchronous function.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Params) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wrap an async function.
    pub fn suspending<F, Fut>(f: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Suspending(Arc::new(move |params| Box::pin(f(params))))
    }

    /// A handler that always answers with `value`.
    pub fn respond(value: Value) -> Self {
        Self::sync(move |_| Ok(value.clone()))
    }

    /// Whether this handler returns a future.
    pub fn is_suspending(&self) -> bool {
        matches!(self, Self::Suspending(_))
    }

    /// Invoke the handler with already-bound parameters.
    pub async fn invoke(&self, params: Params) -> HandlerResult {
        match self {
            Self::Sync(f) => f(params),
            Self::Suspending(f) => f(params).await,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Handler::Sync"),
            Self::Suspending(_) => f.write_str("Handler::Suspending"),
        }
    }
}

/// HTTP method a handler can be reached with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`, parameters from the query string.
    Get,
    /// `POST`, parameters from the request body.
    Post,
}

impl Method {
    /// Upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("GET") {
            Ok(Self::Get)
        } else if s.eq_ignore_ascii_case("POST") {
            Ok(Self::Post)
        } else {
            Err(format!("unsupported HTTP method: {}", s))
        }
    }
}

/// Capability flags: which methods a handler accepts.
///
/// Defaults to POST only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSet {
    /// Accepts `GET`.
    pub get: bool,
    /// Accepts `POST`.
    pub post: bool,
}

impl Default for MethodSet {
    fn default() -> Self {
        Self::POST_ONLY
    }
}

impl MethodSet {
    /// Only `POST`.
    pub const POST_ONLY: Self = Self {
        get: false,
        post: true,
    };

    /// `GET` and `POST`.
    pub const GET_AND_POST: Self = Self {
        get: true,
        post: true,
    };

    /// Build a set from method names; an empty list means the default.
    pub fn from_names<I, S>(names: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self {
            get: false,
            post: false,
        };
        let mut any = false;
        for name in names {
            any = true;
            match name.as_ref().parse::<Method>()? {
                Method::Get => set.get = true,
                Method::Post => set.post = true,
            }
        }
        Ok(if any { set } else { Self::default() })
    }

    /// Whether `method` is accepted.
    pub fn allows(&self, method: Method) -> bool {
        match method {
            Method::Get => self.get,
            Method::Post => self.post,
        }
    }

    /// Accepted method names in canonical order.
    pub fn names(&self) -> Vec<String> {
        [Method::Get, Method::Post]
            .into_iter()
            .filter(|m| self.allows(*m))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// Everything the registry knows about one handler.
///
/// Immutable once published; a reload replaces the whole descriptor.
#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    /// The callable.
    pub handler: Handler,
    /// Accepted methods.
    pub methods: MethodSet,
    /// Declared parameters.
    pub params: Vec<ParamSpec>,
    /// Optional human-readable description.
    pub description: Option<String>,
}

impl HandlerDescriptor {
    /// Descriptor for `handler` accepting POST only, with no parameters.
    pub fn new(handler: Handler) -> Self {
        Self {
            handler,
            methods: MethodSet::default(),
            params: Vec::new(),
            description: None,
        }
    }

    /// Set the accepted methods.
    pub fn with_methods(mut self, methods: MethodSet) -> Self {
        self.methods = methods;
        self
    }

    /// Set the declared parameters.
    pub fn with_params(mut self, params: Vec<ParamSpec>) -> Self {
        self.params = params;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Bind `raw` against the declared parameters and invoke the handler.
    pub async fn invoke(&self, raw: Params) -> HandlerResult {
        let params = bind_params(&self.params, raw)?;
        self.handler.invoke(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::params::ParamType;
    use serde_json::json;

    #[test]
    fn test_method_parse_case_insensitive() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("Post".parse::<Method>().unwrap(), Method::Post);
        assert!("DELETE".parse::<Method>().is_err());
    }

    #[test]
    fn test_method_set_defaults_to_post_only() {
        let empty: [&str; 0] = [];
        assert_eq!(MethodSet::from_names(empty).unwrap(), MethodSet::POST_ONLY);
        assert_eq!(MethodSet::default().names(), vec!["POST"]);
        assert_eq!(
            MethodSet::from_names(["GET", "post"]).unwrap(),
            MethodSet::GET_AND_POST
        );
        assert!(MethodSet::from_names(["PATCH"]).is_err());
    }

    #[tokio::test]
    async fn test_invoke_sync_and_suspending() {
        let sync = Handler::sync(|p| Ok(json!({ "echo": p })));
        let suspending = Handler::suspending(|p: Params| async move {
            tokio::task::yield_now().await;
            Ok(json!(p.len()))
        });

        assert!(!sync.is_suspending());
        assert!(suspending.is_suspending());

        let mut params = Params::new();
        params.insert("a".to_string(), json!(1));
        assert_eq!(sync.invoke(params.clone()).await.unwrap(), json!({"echo": {"a": 1}}));
        assert_eq!(suspending.invoke(params).await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_descriptor_binds_params() {
        let descriptor = HandlerDescriptor::new(Handler::sync(|p| {
            Ok(json!(format!("Hello, {}!", p["name"].as_str().unwrap_or_default())))
        }))
        .with_params(vec![ParamSpec::new("name", ParamType::String).with_default("World")]);

        assert_eq!(descriptor.invoke(Params::new()).await.unwrap(), json!("Hello, World!"));

        let mut bad = Params::new();
        bad.insert("other".to_string(), json!(1));
        assert!(matches!(
            descriptor.invoke(bad).await,
            Err(HandlerError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_respond_ignores_params() {
        let handler = Handler::respond(json!({"version": "1.0"}));
        let mut params = Params::new();
        params.insert("anything".to_string(), json!(true));

        let out = tokio_test::block_on(handler.invoke(params)).unwrap();
        assert_eq!(out, json!({"version": "1.0"}));
    }
}
