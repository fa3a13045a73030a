//! Metrics collection for the filter cache engine
//!
//! Counters are registered against a crate-local Prometheus registry so the
//! hosting process can scrape or merge them; collection overhead on the
//! probe path is one atomic increment.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_with_registry, IntCounter, Registry};

/// Crate-local metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Probe-path counters
pub struct ProbeMetrics {
    /// Total `check_key` probes
    pub probes: IntCounter,
    /// Probes answered `false` (segment read skipped)
    pub negatives: IntCounter,
    /// Probes against segments with no cached filter item
    pub misses: IntCounter,
}

/// Allocation-path counters
pub struct AllocationMetrics {
    /// One-unit swaps applied by the adjuster
    pub unit_swaps: IntCounter,
    /// Training rounds submitted to the classifier service
    pub train_rounds: IntCounter,
    /// Prediction batches that fell back to the default units
    pub predict_fallbacks: IntCounter,
    /// Short-period rollovers observed
    pub short_rollovers: IntCounter,
    /// Long-period rollovers observed
    pub long_rollovers: IntCounter,
}

/// Centralized metrics collection
pub struct Metrics {
    /// Probe-path counters
    pub probe: ProbeMetrics,
    /// Allocation-path counters
    pub allocation: AllocationMetrics,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        Ok(Self {
            probe: ProbeMetrics {
                probes: register_int_counter_with_registry!(
                    "fc_probes_total",
                    "Total filter cache probes",
                    REGISTRY.clone()
                )?,
                negatives: register_int_counter_with_registry!(
                    "fc_probe_negatives_total",
                    "Probes that excluded the segment",
                    REGISTRY.clone()
                )?,
                misses: register_int_counter_with_registry!(
                    "fc_probe_misses_total",
                    "Probes against segments without a cached item",
                    REGISTRY.clone()
                )?,
            },
            allocation: AllocationMetrics {
                unit_swaps: register_int_counter_with_registry!(
                    "fc_unit_swaps_total",
                    "One-unit swaps applied by the twin-heap adjuster",
                    REGISTRY.clone()
                )?,
                train_rounds: register_int_counter_with_registry!(
                    "fc_train_rounds_total",
                    "Training rounds submitted to the classifier",
                    REGISTRY.clone()
                )?,
                predict_fallbacks: register_int_counter_with_registry!(
                    "fc_predict_fallbacks_total",
                    "Prediction batches that fell back to defaults",
                    REGISTRY.clone()
                )?,
                short_rollovers: register_int_counter_with_registry!(
                    "fc_short_rollovers_total",
                    "Short-period rollovers",
                    REGISTRY.clone()
                )?,
                long_rollovers: register_int_counter_with_registry!(
                    "fc_long_rollovers_total",
                    "Long-period rollovers",
                    REGISTRY.clone()
                )?,
            },
        })
    }

    /// Get the global metrics instance
    pub fn global() -> &'static Metrics {
        static INSTANCE: Lazy<Metrics> = Lazy::new(|| {
            Metrics::new().expect("Failed to initialize metrics")
        });
        &INSTANCE
    }
}

/// Access the crate-local registry, e.g. to merge into a host registry
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Initialize the registry eagerly so registration errors surface at startup
pub fn init_registry() {
    let _ = Metrics::global();
}
