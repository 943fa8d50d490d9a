//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `reload_executed_total` - Reload outcomes by success
//! - `reload_executed_total_by_namespace` - Per-namespace reload outcomes (opt-in)
//! - `reconcile_total` / `reconcile_duration_seconds` - Reconcile passes by result
//! - `action_total` / `action_latency_seconds` - Workload write actions by kind
//! - `skipped_total` - Events dropped by the predicate layer, by reason
//! - `workqueue_depth` / `workqueue_adds_total` / `workqueue_latency_seconds` - Work pipeline
//! - `errors_total` / `retries_total` - Failure bookkeeping
//! - `events_received_total` / `events_processed_total` - Watch event flow
//! - `workloads_scanned_total` / `workloads_matched_total` - Matcher coverage

use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RELOAD_EXECUTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("reload_executed_total", "Total number of reload executions"),
        &["success"],
    )
    .expect("Failed to create RELOAD_EXECUTED_TOTAL metric - this should never happen")
});

static RELOAD_EXECUTED_TOTAL_BY_NAMESPACE: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "reload_executed_total_by_namespace",
            "Total number of reload executions by namespace (opt-in, high cardinality)",
        ),
        &["success", "namespace"],
    )
    .expect(
        "Failed to create RELOAD_EXECUTED_TOTAL_BY_NAMESPACE metric - this should never happen",
    )
});

static RECONCILE_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("reconcile_total", "Total number of reconcile passes"),
        &["result"],
    )
    .expect("Failed to create RECONCILE_TOTAL metric - this should never happen")
});

static RECONCILE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "reconcile_duration_seconds",
            "Duration of reconcile passes in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["result"],
    )
    .expect("Failed to create RECONCILE_DURATION metric - this should never happen")
});

static ACTION_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("action_total", "Total number of workload write actions"),
        &["workload_kind", "result"],
    )
    .expect("Failed to create ACTION_TOTAL metric - this should never happen")
});

static ACTION_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "action_latency_seconds",
            "Latency of workload write actions in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["workload_kind"],
    )
    .expect("Failed to create ACTION_LATENCY metric - this should never happen")
});

static SKIPPED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "skipped_total",
            "Total number of events dropped by the predicate layer",
        ),
        &["reason"],
    )
    .expect("Failed to create SKIPPED_TOTAL metric - this should never happen")
});

static WORKQUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("workqueue_depth", "Number of in-flight reconcile items")
        .expect("Failed to create WORKQUEUE_DEPTH metric - this should never happen")
});

static WORKQUEUE_ADDS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "workqueue_adds_total",
        "Total number of items handed to the reconcile pipeline",
    )
    .expect("Failed to create WORKQUEUE_ADDS_TOTAL metric - this should never happen")
});

static WORKQUEUE_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "workqueue_latency_seconds",
            "Time an item spends in the reconcile pipeline in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
        &["resource_type"],
    )
    .expect("Failed to create WORKQUEUE_LATENCY metric - this should never happen")
});

static ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("errors_total", "Total number of errors by type"),
        &["type"],
    )
    .expect("Failed to create ERRORS_TOTAL metric - this should never happen")
});

static RETRIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "retries_total",
        "Total number of conflict retries performed by the update driver",
    )
    .expect("Failed to create RETRIES_TOTAL metric - this should never happen")
});

static EVENTS_RECEIVED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "events_received_total",
            "Total number of watch events received",
        ),
        &["event_type", "resource_type"],
    )
    .expect("Failed to create EVENTS_RECEIVED_TOTAL metric - this should never happen")
});

static EVENTS_PROCESSED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "events_processed_total",
            "Total number of watch events processed past the predicate layer",
        ),
        &["event_type", "resource_type", "result"],
    )
    .expect("Failed to create EVENTS_PROCESSED_TOTAL metric - this should never happen")
});

static WORKLOADS_SCANNED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "workloads_scanned_total",
            "Total number of workloads evaluated by the matcher",
        ),
        &["kind"],
    )
    .expect("Failed to create WORKLOADS_SCANNED_TOTAL metric - this should never happen")
});

static WORKLOADS_MATCHED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "workloads_matched_total",
            "Total number of workloads that produced a reload decision",
        ),
        &["kind"],
    )
    .expect("Failed to create WORKLOADS_MATCHED_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    // Prometheus Registry::register() takes ownership (Box<dyn Collector>)
    // Since metrics are stored in LazyLock, we must clone them.
    // Prometheus metrics internally use Arc for their data, so cloning is cheap.
    REGISTRY.register(Box::new(RELOAD_EXECUTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RELOAD_EXECUTED_TOTAL_BY_NAMESPACE.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_DURATION.clone()))?;
    REGISTRY.register(Box::new(ACTION_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACTION_LATENCY.clone()))?;
    REGISTRY.register(Box::new(SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKQUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(WORKQUEUE_ADDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKQUEUE_LATENCY.clone()))?;
    REGISTRY.register(Box::new(ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RETRIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EVENTS_RECEIVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EVENTS_PROCESSED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKLOADS_SCANNED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKLOADS_MATCHED_TOTAL.clone()))?;

    Ok(())
}

pub fn record_reload_executed(success: bool, namespace: &str, by_namespace: bool) {
    let label = if success { "true" } else { "false" };
    RELOAD_EXECUTED_TOTAL.with_label_values(&[label]).inc();
    if by_namespace {
        RELOAD_EXECUTED_TOTAL_BY_NAMESPACE
            .with_label_values(&[label, namespace])
            .inc();
    }
}

pub fn record_reconcile(result: &str, duration: f64) {
    RECONCILE_TOTAL.with_label_values(&[result]).inc();
    RECONCILE_DURATION
        .with_label_values(&[result])
        .observe(duration);
}

pub fn record_action(workload_kind: &str, result: &str, duration: f64) {
    ACTION_TOTAL
        .with_label_values(&[workload_kind, result])
        .inc();
    ACTION_LATENCY
        .with_label_values(&[workload_kind])
        .observe(duration);
}

pub fn increment_skipped(reason: &str) {
    SKIPPED_TOTAL.with_label_values(&[reason]).inc();
}

pub fn workqueue_item_start() {
    WORKQUEUE_ADDS_TOTAL.inc();
    WORKQUEUE_DEPTH.inc();
}

pub fn workqueue_item_done(resource_type: &str, duration: f64) {
    WORKQUEUE_DEPTH.dec();
    WORKQUEUE_LATENCY
        .with_label_values(&[resource_type])
        .observe(duration);
}

pub fn increment_errors(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

pub fn increment_retries() {
    RETRIES_TOTAL.inc();
}

pub fn increment_events_received(event_type: &str, resource_type: &str) {
    EVENTS_RECEIVED_TOTAL
        .with_label_values(&[event_type, resource_type])
        .inc();
}

pub fn increment_events_processed(event_type: &str, resource_type: &str, result: &str) {
    EVENTS_PROCESSED_TOTAL
        .with_label_values(&[event_type, resource_type, result])
        .inc();
}

pub fn increment_workloads_scanned(kind: &str) {
    WORKLOADS_SCANNED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_workloads_matched(kind: &str) {
    WORKLOADS_MATCHED_TOTAL.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // This should not panic - metrics should register successfully
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_record_reload_executed() {
        let before = RELOAD_EXECUTED_TOTAL.with_label_values(&["true"]).get();
        record_reload_executed(true, "ns-x", false);
        let after = RELOAD_EXECUTED_TOTAL.with_label_values(&["true"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_record_reload_executed_by_namespace_opt_in() {
        let before = RELOAD_EXECUTED_TOTAL_BY_NAMESPACE
            .with_label_values(&["false", "ns-y"])
            .get();
        record_reload_executed(false, "ns-y", false);
        let untouched = RELOAD_EXECUTED_TOTAL_BY_NAMESPACE
            .with_label_values(&["false", "ns-y"])
            .get();
        assert_eq!(untouched, before);

        record_reload_executed(false, "ns-y", true);
        let after = RELOAD_EXECUTED_TOTAL_BY_NAMESPACE
            .with_label_values(&["false", "ns-y"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_record_reconcile() {
        let before = RECONCILE_TOTAL.with_label_values(&["success"]).get();
        record_reconcile("success", 0.25);
        let after = RECONCILE_TOTAL.with_label_values(&["success"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_record_action() {
        let before = ACTION_TOTAL
            .with_label_values(&["Deployment", "updated"])
            .get();
        record_action("Deployment", "updated", 0.1);
        let after = ACTION_TOTAL
            .with_label_values(&["Deployment", "updated"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_workqueue_depth_balances() {
        let before = WORKQUEUE_DEPTH.get();
        workqueue_item_start();
        assert_eq!(WORKQUEUE_DEPTH.get(), before + 1);
        workqueue_item_done("configmap", 0.05);
        assert_eq!(WORKQUEUE_DEPTH.get(), before);
    }

    #[test]
    fn test_increment_skipped() {
        let before = SKIPPED_TOTAL.with_label_values(&["content-unchanged"]).get();
        increment_skipped("content-unchanged");
        let after = SKIPPED_TOTAL.with_label_values(&["content-unchanged"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_retries() {
        let before = RETRIES_TOTAL.get();
        increment_retries();
        assert_eq!(RETRIES_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_event_counters() {
        let before = EVENTS_RECEIVED_TOTAL
            .with_label_values(&["update", "configmap"])
            .get();
        increment_events_received("update", "configmap");
        let after = EVENTS_RECEIVED_TOTAL
            .with_label_values(&["update", "configmap"])
            .get();
        assert_eq!(after, before + 1u64);

        let before = EVENTS_PROCESSED_TOTAL
            .with_label_values(&["update", "configmap", "reloaded"])
            .get();
        increment_events_processed("update", "configmap", "reloaded");
        let after = EVENTS_PROCESSED_TOTAL
            .with_label_values(&["update", "configmap", "reloaded"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_matcher_counters() {
        let before = WORKLOADS_SCANNED_TOTAL.with_label_values(&["Deployment"]).get();
        increment_workloads_scanned("Deployment");
        assert_eq!(
            WORKLOADS_SCANNED_TOTAL.with_label_values(&["Deployment"]).get(),
            before + 1u64
        );

        let before = WORKLOADS_MATCHED_TOTAL.with_label_values(&["Deployment"]).get();
        increment_workloads_matched("Deployment");
        assert_eq!(
            WORKLOADS_MATCHED_TOTAL.with_label_values(&["Deployment"]).get(),
            before + 1u64
        );
    }
}
