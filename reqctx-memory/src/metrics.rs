//! Capacity metrics for [`MapBackend`](crate::MapBackend).
//!
//! Enable the `metrics` feature to record these.
//!
//! ## Metrics
//!
//! - `reqctx_memory_entries` - current number of entries in the map (gauge)
//!
//! The metric carries a `backend` label so multiple [`MapBackend`](crate::MapBackend)
//! instances stay distinguishable.

#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "metrics")]
fn entries_gauge_name() -> &'static str {
    static NAME: OnceLock<&'static str> = OnceLock::new();
    *NAME.get_or_init(|| {
        metrics::describe_gauge!("reqctx_memory_entries", "Current number of entries in a MapBackend.");
        "reqctx_memory_entries"
    })
}

/// Record the current entry count for `backend` (no-op when `metrics` is disabled).
#[cfg(feature = "metrics")]
#[inline]
pub fn record_capacity(backend: &str, entries: u64) {
    metrics::gauge!(entries_gauge_name(), "backend" => backend.to_string()).set(entries as f64);
}

/// Record the current entry count for `backend` (no-op when `metrics` is disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_capacity(_backend: &str, _entries: u64) {}
