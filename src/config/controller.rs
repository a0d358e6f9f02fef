//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::*;
use crate::gc::{parse_descriptors, ResourceTypeDescriptor};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Resource types collected from a deleted cluster's namespace
    /// Entries are `group/version/resource`; malformed entries are skipped
    pub gc_resource_list: Vec<String>,
    /// Enables resource-type GC and the full RBAC/ManifestWork cleanup
    /// When false only the RBAC objects created for a cluster are removed
    pub resource_cleanup_enabled: bool,
    /// Number of clusters synced concurrently
    pub workers: usize,
    /// Delay before a cluster with incomplete cleanup is synced again (seconds)
    pub requeue_delay_secs: u64,
    /// Read-modify-write attempts before a conflict is reported
    pub conflict_retries: u32,
    /// Interval for re-enqueuing every cached cluster (seconds, 0 disables)
    pub resync_interval_secs: u64,
    /// Fibonacci backoff bounds after a failed sync (seconds)
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            gc_resource_list: split_list(DEFAULT_GC_RESOURCE_LIST),
            resource_cleanup_enabled: true,
            workers: DEFAULT_WORKERS,
            requeue_delay_secs: DEFAULT_REQUEUE_DELAY_SECS,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: "text".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            gc_resource_list: split_list(&env_var_or_default_str(
                "GC_RESOURCE_LIST",
                DEFAULT_GC_RESOURCE_LIST,
            )),
            resource_cleanup_enabled: env_var_or_default_bool("RESOURCE_CLEANUP_ENABLED", true),
            workers: env_var_or_default("WORKERS", DEFAULT_WORKERS).max(1),
            requeue_delay_secs: env_var_or_default(
                "REQUEUE_DELAY_SECS",
                DEFAULT_REQUEUE_DELAY_SECS,
            ),
            conflict_retries: env_var_or_default("CONFLICT_RETRIES", DEFAULT_CONFLICT_RETRIES)
                .max(1),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
        }
    }

    /// Parsed resource types, malformed entries logged and skipped
    #[must_use]
    pub fn gc_resources(&self) -> Vec<ResourceTypeDescriptor> {
        parse_descriptors(self.gc_resource_list.iter().map(String::as_str))
    }

    /// Get requeue delay duration
    pub fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.requeue_delay_secs)
    }

    /// Get resync interval, `None` when resync is disabled
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

/// Split a comma-separated list, dropping empty entries
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
