//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `cluster_gc_syncs_total` - Total number of cluster syncs
//! - `cluster_gc_sync_errors_total` - Total number of failed syncs
//! - `cluster_gc_sync_duration_seconds` - Duration of sync operations
//! - `cluster_gc_requeues_total` - Requeues by trigger (incomplete cleanup, error backoff)
//! - `cluster_gc_finalizers_added_total` - Cleanup finalizers installed
//! - `cluster_gc_finalizers_removed_total` - Cleanup finalizers released
//! - `cluster_gc_resources_deleted_total` - Dependent resources deleted by resource type
//! - `cluster_gc_bindings_deleted_total` - RBAC objects deleted by kind
//! - `cluster_gc_manifestworks_deleted_total` - Pending ManifestWorks deleted

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static SYNCS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("cluster_gc_syncs_total", "Total number of cluster syncs")
        .expect("Failed to create SYNCS_TOTAL metric - this should never happen")
});

static SYNC_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_gc_sync_errors_total",
        "Total number of cluster syncs that returned an error",
    )
    .expect("Failed to create SYNC_ERRORS_TOTAL metric - this should never happen")
});

static SYNC_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "cluster_gc_sync_duration_seconds",
            "Duration of cluster syncs in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create SYNC_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("cluster_gc_requeues_total", "Total number of requeues by trigger"),
        &["trigger"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static FINALIZERS_ADDED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_gc_finalizers_added_total",
        "Total number of cleanup finalizers added to ManagedClusters",
    )
    .expect("Failed to create FINALIZERS_ADDED_TOTAL metric - this should never happen")
});

static FINALIZERS_REMOVED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_gc_finalizers_removed_total",
        "Total number of cleanup finalizers removed from ManagedClusters",
    )
    .expect("Failed to create FINALIZERS_REMOVED_TOTAL metric - this should never happen")
});

static RESOURCES_DELETED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cluster_gc_resources_deleted_total",
            "Total number of dependent resources deleted by resource type",
        ),
        &["resource"],
    )
    .expect("Failed to create RESOURCES_DELETED_TOTAL metric - this should never happen")
});

static BINDINGS_DELETED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cluster_gc_bindings_deleted_total",
            "Total number of RBAC objects deleted by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create BINDINGS_DELETED_TOTAL metric - this should never happen")
});

static WORKS_DELETED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_gc_manifestworks_deleted_total",
        "Total number of pending ManifestWorks deleted",
    )
    .expect("Failed to create WORKS_DELETED_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(SYNCS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FINALIZERS_ADDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FINALIZERS_REMOVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCES_DELETED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BINDINGS_DELETED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKS_DELETED_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_syncs() {
    SYNCS_TOTAL.inc();
}

pub fn increment_sync_errors() {
    SYNC_ERRORS_TOTAL.inc();
}

pub fn observe_sync_duration(duration: f64) {
    SYNC_DURATION.observe(duration);
}

/// Requeue because cleanup is still in progress
pub fn increment_requeues() {
    REQUEUES_TOTAL.with_label_values(&["cleanup-incomplete"]).inc();
}

/// Requeue scheduled by the error backoff
pub fn increment_error_requeues() {
    REQUEUES_TOTAL.with_label_values(&["error-backoff"]).inc();
}

pub fn increment_finalizers_added() {
    FINALIZERS_ADDED_TOTAL.inc();
}

pub fn increment_finalizers_removed() {
    FINALIZERS_REMOVED_TOTAL.inc();
}

pub fn increment_resources_deleted(resource: &str) {
    RESOURCES_DELETED_TOTAL.with_label_values(&[resource]).inc();
}

pub fn increment_bindings_deleted(kind: &str) {
    BINDINGS_DELETED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_works_deleted() {
    WORKS_DELETED_TOTAL.inc();
}

/// Encode every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String> {
    use prometheus::{Encoder, TextEncoder};
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
