//! Numeric read-boundary helpers
//!
//! Stored points and scores have historically contained NaN. Every value read
//! from storage passes through [`coerce_nan`] so aggregation never sees NaN.
//! Coercions are counted in [`DataQualityMetrics`] so the bad records can be
//! found and backfilled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Counters for values repaired at the read boundary.
///
/// All operations are atomic and lock-free.
#[derive(Debug)]
pub struct DataQualityMetrics {
    nan_coercions: AtomicU64,
    reported: AtomicBool,
    enabled: AtomicBool,
}

impl DataQualityMetrics {
    pub const fn new() -> Self {
        Self {
            nan_coercions: AtomicU64::new(0),
            reported: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
        }
    }

    /// Record one NaN coerced to zero
    pub fn record_nan(&self, field: &'static str) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }

        let total = self.nan_coercions.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.reported.swap(true, Ordering::Relaxed) {
            tracing::warn!(field, "NaN found in stored value, coercing to 0");
        } else {
            tracing::debug!(field, total, "NaN coerced to 0");
        }
    }

    /// Number of NaN values coerced so far
    pub fn nan_coercions(&self) -> u64 {
        self.nan_coercions.load(Ordering::Relaxed)
    }

    /// Enable or disable counting and logging
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.nan_coercions.store(0, Ordering::Relaxed);
        self.reported.store(false, Ordering::Relaxed);
    }
}

impl Default for DataQualityMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: DataQualityMetrics = DataQualityMetrics::new();

/// Process-wide data quality counters
pub fn metrics() -> &'static DataQualityMetrics {
    &METRICS
}

/// Replace NaN with 0, recording the repair against `field`
pub fn coerce_nan(field: &'static str, value: f64) -> f64 {
    if value.is_nan() {
        METRICS.record_nan(field);
        0.0
    } else {
        value
    }
}

/// [`coerce_nan`] for nullable columns; NULL stays NULL
pub fn coerce_nan_opt(field: &'static str, value: Option<f64>) -> Option<f64> {
    value.map(|v| coerce_nan(field, v))
}
