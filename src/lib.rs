//! ManagedCluster GC Controller Library
//!
//! Hub-side controller that keeps a cleanup finalizer on every
//! ManagedCluster and, once a cluster is deleted, removes everything created
//! on its behalf before releasing the record.

pub mod config;
pub mod constants;
pub mod crd;
pub mod error;
pub mod gc;
pub mod observability;
pub mod patcher;
pub mod runtime;
pub mod server;
pub mod store;

pub use error::{AggregateError, Error, Result};
