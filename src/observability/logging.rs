//! # Logging
//!
//! Tracing subscriber setup. `RUST_LOG` overrides the default filter;
//! `LOG_FORMAT=json` switches to structured JSON lines.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "cluster_gc_controller=info";

pub fn init_tracing(log_format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if log_format.eq_ignore_ascii_case("json") {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))
    }
}
