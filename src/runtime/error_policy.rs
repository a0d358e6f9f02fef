//! # Error Policy
//!
//! Backoff for clusters whose sync failed. State is tracked per cluster so a
//! single broken cluster does not slow down the others.

use crate::crd::ManagedCluster;
use crate::error::Error;
use crate::observability::metrics;
use crate::runtime::backoff::FibonacciBackoff;
use crate::runtime::reconcile::Context;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Fallback delay when the backoff state cannot be read
const FALLBACK_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

#[derive(Debug)]
pub struct ErrorPolicy {
    min_secs: u64,
    max_secs: u64,
    states: Mutex<HashMap<String, BackoffState>>,
}

impl ErrorPolicy {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            max_secs,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failed sync and return how long to wait before the next one
    pub fn next_delay(&self, key: &str) -> Duration {
        let (delay, error_count) = match self.states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_insert_with(|| BackoffState {
                    backoff: FibonacciBackoff::new(self.min_secs, self.max_secs),
                    error_count: 0,
                });
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using default backoff", e);
                (FALLBACK_DELAY, 0)
            }
        };

        info!(
            cluster = %key,
            delay_secs = delay.as_secs(),
            error_count,
            "retrying with Fibonacci backoff"
        );
        metrics::increment_error_requeues();
        delay
    }

    /// Reset the backoff of a cluster after a successful sync
    pub fn forget(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }
}

/// Handle a failed sync with per-cluster Fibonacci backoff
pub fn handle_sync_error(cluster: Arc<ManagedCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = cluster.name_any();
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "gc.sync_error",
        cluster = %name,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Sync failed for {}: {}", name, error);
    Action::requeue(ctx.policy.next_delay(&name))
}
