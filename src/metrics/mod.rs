//! OpenTelemetry metrics for the reload pipeline.
//!
//! Enabled with the `metrics` feature. Attach a [`ReloadMetrics`] through
//! the service builder and the coordinator records:
//! - unit reload attempts, successes and failures
//! - time spent in the loader
//! - schedule requests coalesced into a pending reload
//! - configuration reloads
//!
//! # Examples
//!
//! ```rust,no_run
//! use hotswap_handlers::prelude::*;
//! use opentelemetry::global;
//!
//! # async fn example() -> Result<()> {
//! let service = HotReloadService::builder()
//!     .with_units_dir("apis")
//!     .with_metrics(global::meter("my-service"))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod reload_metrics;

pub use reload_metrics::ReloadMetrics;
