//! Error taxonomy for node network resolution
//!
//! Every failure is terminal for the assembler: nothing here is retried
//! internally, the caller re-runs the whole pipeline instead.

use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Errors raised while resolving the node network configuration
#[derive(Debug, Error)]
pub enum NetconfError {
    /// The Node object does not exist in the cluster
    #[error("Node not found: {0}")]
    NotFound(String),

    /// Transport or authorization failure talking to the cluster API
    #[error("Cluster API error: {0}")]
    Api(#[from] kube::Error),

    /// The Node object reports no address of type InternalIP
    #[error("Node {0} has no InternalIP address")]
    NoAddress(String),

    /// An address reported by the Node object could not be parsed
    #[error("Failed to parse address {address:?} of node {node}")]
    Parse { node: String, address: String },

    /// A CIDR string is malformed or unusable
    #[error("Invalid CIDR {cidr:?}: {reason}")]
    InvalidCidr { cidr: String, reason: String },

    /// The Node object carries no pod CIDR
    #[error("Node {0} has no pod CIDR assigned")]
    MissingPodCidr(String),

    /// An OS table query failed
    #[error("Failed to {operation}: {reason}")]
    Lookup {
        operation: &'static str,
        reason: String,
    },

    /// No host interface carries the given address
    #[error("No interface is bound to {0}")]
    InterfaceNotFound(IpAddr),

    /// The neighbour table has no resolved entry for the given address
    #[error("No neighbour entry for {address} on interface {interface}")]
    NoNeighborEntry { interface: String, address: Ipv4Addr },

    /// The routing probe returned no usable route
    #[error("No default route towards {0}")]
    NoRoute(Ipv4Addr),

    /// The routing probe returned more than one route
    #[error("Expected a single default route, got {0}")]
    AmbiguousResult(usize),

    /// The default route leaves through a different interface
    #[error("Route egress interface index {route} does not match external interface index {interface}")]
    InterfaceMismatch { route: u32, interface: u32 },

    /// The tunnel address block cannot hold the node's endpoint
    #[error("Tunnel block {block} has no room for node slot {slot}")]
    TunnelBlockExhausted { block: ipnet::Ipv4Net, slot: u32 },

    /// A configuration was already published for this process
    #[error("Node network configuration already published")]
    AlreadyPublished,
}

impl NetconfError {
    pub(crate) fn lookup(operation: &'static str, err: impl std::fmt::Display) -> Self {
        NetconfError::Lookup {
            operation,
            reason: err.to_string(),
        }
    }

    pub(crate) fn invalid_cidr(cidr: impl Into<String>, reason: impl Into<String>) -> Self {
        NetconfError::InvalidCidr {
            cidr: cidr.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NetconfError>;
