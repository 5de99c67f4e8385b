//! Reload metrics over OpenTelemetry.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use std::time::Instant;

/// Counters and timings for unit and configuration reloads.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_handlers::metrics::ReloadMetrics;
/// use opentelemetry::global;
///
/// let metrics = ReloadMetrics::new(global::meter("hotswap-handlers"));
/// let timer = metrics.start_reload("greet");
/// // ... reload ...
/// metrics.record_reload_success("greet", timer);
/// ```
#[derive(Clone)]
pub struct ReloadMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    coalesced: Counter<u64>,
    config_reloads: Counter<u64>,
}

impl ReloadMetrics {
    /// Create the instruments on `meter`.
    pub fn new(meter: Meter) -> Self {
        Self {
            reload_attempts: meter
                .u64_counter("hotswap_handlers.reload.attempts")
                .with_description("Unit reloads started")
                .build(),
            reload_success: meter
                .u64_counter("hotswap_handlers.reload.success")
                .with_description("Unit reloads that published or removed the unit")
                .build(),
            reload_failures: meter
                .u64_counter("hotswap_handlers.reload.failures")
                .with_description("Unit reloads that failed or panicked")
                .build(),
            reload_duration: meter
                .f64_histogram("hotswap_handlers.reload.duration")
                .with_description("Time spent in the unit loader")
                .with_unit("s")
                .build(),
            coalesced: meter
                .u64_counter("hotswap_handlers.schedule.coalesced")
                .with_description("Reload requests absorbed by a pending reload")
                .build(),
            config_reloads: meter
                .u64_counter("hotswap_handlers.config.reloads")
                .with_description("Configuration reload attempts")
                .build(),
        }
    }

    /// Count a reload start and return its timer.
    pub fn start_reload(&self, unit: &str) -> Instant {
        self.reload_attempts.add(1, &[unit_attr(unit)]);
        Instant::now()
    }

    /// Record a reload that completed.
    pub fn record_reload_success(&self, unit: &str, start: Instant) {
        let attrs = [unit_attr(unit)];
        self.reload_success.add(1, &attrs);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &attrs);
    }

    /// Record a reload that failed.
    pub fn record_reload_failure(&self, unit: &str, start: Instant) {
        let attrs = [unit_attr(unit)];
        self.reload_failures.add(1, &attrs);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &attrs);
    }

    /// Count a schedule request that did not add a reload.
    pub fn record_coalesced(&self, unit: &str) {
        self.coalesced.add(1, &[unit_attr(unit)]);
    }

    /// Count a configuration reload and whether it applied.
    pub fn record_config_reload(&self, applied: bool) {
        self.config_reloads.add(1, &[KeyValue::new("applied", applied)]);
    }
}

fn unit_attr(unit: &str) -> KeyValue {
    KeyValue::new("unit", unit.to_string())
}
