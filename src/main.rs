//! # ManagedCluster GC Controller
//!
//! Guards ManagedCluster deletion with a finalizer and cleans up the
//! cluster's namespace resources, RBAC and pending ManifestWorks before the
//! record is released.
//!
//! ## Configuration
//!
//! See `ControllerConfig::from_env` for the environment variables read at startup.

use anyhow::Result;
use cluster_gc_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init).await
}
