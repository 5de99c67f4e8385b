//! # hotswap-handlers
//!
//! Hot reload of request handlers without restarting or interrupting
//! in-flight requests.
//!
//! ## Overview
//!
//! Handlers live in *units*: manifest files in a flat directory, one per
//! unit, each declaring a set of named handlers. `hotswap-handlers` watches
//! that directory and turns file changes into safe registry updates:
//! - the [`Registry`](registry::Registry) is never observed half-updated
//!   (lock-free reads through `arc-swap`)
//! - bursts of edits to one unit collapse into a single debounced reload
//! - a unit that fails to load keeps its previous handlers and never
//!   affects other units
//!
//! Notifications arrive on the watcher thread and cross into tokio through
//! an explicit channel; blocking load work runs on a bounded worker pool.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hotswap_handlers::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> hotswap_handlers::error::Result<()> {
//! let catalog = HandlerCatalog::with_builtins()
//!     .with_sync("add", |params| {
//!         let a = params.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
//!         let b = params.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
//!         Ok(json!(a + b))
//!     });
//!
//! let service = HotReloadService::builder()
//!     .with_config_file("service.toml")
//!     .with_env_overrides("HOTSWAP", "__")
//!     .with_catalog(catalog)
//!     .build()
//!     .await?;
//!
//! service.start().await?;
//!
//! // apis/math.toml:
//! //   [[handlers]]
//! //   name = "add"
//! //   methods = ["GET"]
//! //   action = "add"
//! let sum = service
//!     .invoke("math", "add", Method::Get, Params::new())
//!     .await?;
//! println!("{:?}", sum);
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `file-watch` (default): watch the unit directory and settings file
//! - `metrics`: OpenTelemetry reload metrics

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod registry;
pub mod reload;
pub mod sources;
pub mod telemetry;
pub mod units;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{HotReloadService, HotReloadServiceBuilder, ServiceConfig, Validate};
    pub use crate::error::{HandlerError, ReloadError, Result, ValidationError};
    pub use crate::notify::{EventSink, LifecycleEvent};
    pub use crate::registry::{Handler, HandlerDescriptor, Method, MethodSet, ParamSpec, ParamType, Params, Registry};
    pub use crate::reload::ScheduleOutcome;
    pub use crate::units::{HandlerCatalog, ReloadSummary};
}
