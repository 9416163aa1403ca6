//! Prometheus metrics for the reconciliation loop.

pub mod registry;

use std::sync::LazyLock;

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

use registry::REGISTRY;

static TICKS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("kubetruth_ticks_total", "Total number of reconciliation ticks")
        .expect("failed to create kubetruth_ticks_total metric")
});

static TICK_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "kubetruth_tick_duration_seconds",
            "Duration of a full reconciliation tick in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("failed to create kubetruth_tick_duration_seconds metric")
});

static PROJECTS_RECONCILED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kubetruth_projects_reconciled_total",
        "Total number of projects successfully reconciled",
    )
    .expect("failed to create kubetruth_projects_reconciled_total metric")
});

static RECONCILE_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kubetruth_reconcile_errors_total",
            "Total number of reconciliation errors by kind",
        ),
        &["kind"],
    )
    .expect("failed to create kubetruth_reconcile_errors_total metric")
});

static RESOURCES_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kubetruth_resources_applied_total",
            "Total number of ConfigMap/Secret apply operations by kind and outcome",
        ),
        &["kind", "outcome"],
    )
    .expect("failed to create kubetruth_resources_applied_total metric")
});

/// Register every metric with the process-wide registry. Call once at
/// startup before the HTTP server starts serving `/metrics`.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(TICKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TICK_DURATION.clone()))?;
    REGISTRY.register(Box::new(PROJECTS_RECONCILED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_APPLIED_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_ticks_total() {
    TICKS_TOTAL.inc();
}

pub fn observe_tick_duration(seconds: f64) {
    TICK_DURATION.observe(seconds);
}

pub fn increment_projects_reconciled() {
    PROJECTS_RECONCILED_TOTAL.inc();
}

pub fn increment_reconcile_errors(kind: &str) {
    RECONCILE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_resources_applied(kind: &str, outcome: &str) {
    RESOURCES_APPLIED_TOTAL.with_label_values(&[kind, outcome]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let before = TICKS_TOTAL.get();
        increment_ticks_total();
        assert_eq!(TICKS_TOTAL.get(), before + 1);
    }

    #[test]
    fn labeled_counters_increment_by_label() {
        let before = RECONCILE_ERRORS_TOTAL.with_label_values(&["config"]).get();
        increment_reconcile_errors("config");
        assert_eq!(
            RECONCILE_ERRORS_TOTAL.with_label_values(&["config"]).get(),
            before + 1
        );
    }

    #[test]
    fn resources_applied_counter_increments_by_kind_and_outcome() {
        let before = RESOURCES_APPLIED_TOTAL.with_label_values(&["ConfigMap", "created"]).get();
        increment_resources_applied("ConfigMap", "created");
        assert_eq!(
            RESOURCES_APPLIED_TOTAL.with_label_values(&["ConfigMap", "created"]).get(),
            before + 1
        );
    }
}
