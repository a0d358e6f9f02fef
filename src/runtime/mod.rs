//! # Runtime
//!
//! Process wiring around the GC controller.
//!
//! - `initialization`: client, server and controller setup
//! - `watch_loop`: runs the ManagedCluster controller until shutdown
//! - `reconcile`: the controller's reconcile function
//! - `absent`: cleanup passes for clusters whose record is already gone
//! - `error_policy`: per-cluster backoff after failed syncs
//! - `backoff`: Fibonacci backoff calculator

pub mod absent;
pub mod backoff;
pub mod error_policy;
pub mod initialization;
pub mod reconcile;
pub mod watch_loop;
