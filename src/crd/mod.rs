//! # Custom Resource Definitions
//!
//! Types of the hub resources the controller reads and writes.
//!
//! Both CRDs are owned by other hub components; only the fields the
//! cleanup logic needs are modelled, everything else round-trips untouched
//! because writes are merge patches.
//!
//! ## Module Structure
//!
//! - `cluster.rs` - ManagedCluster (the fleet member record)
//! - `work.rs` - ManifestWork (work dispatched to a cluster)
//! - `status.rs` - Conditions shared by both

mod cluster;
mod status;
mod work;

pub use cluster::{ManagedCluster, ManagedClusterSpec, ManagedClusterStatus};
pub use status::{find_condition, set_status_condition, Condition, ConditionStatus};
pub use work::{ManifestWork, ManifestWorkSpec, ManifestWorkStatus, ManifestsTemplate};
