//! Cluster Node retrieval
//!
//! Reads the local node's Node object from the cluster API and reduces it
//! to a `NodeRecord`: name, reported addresses, conditions and pod CIDR.

mod fetcher;
mod types;

pub use fetcher::{KubeNodeFetcher, NodeSource};
pub use types::{NodeAddress, NodeCondition, NodeRecord, INTERNAL_IP, READY_CONDITION};
