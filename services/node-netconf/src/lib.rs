//! Node Netconf Library
//!
//! Resolves the local cluster node's network identity for the overlay
//! dataplane: external interface, default gateway, pod-subnet gateway and
//! tunnel endpoint, assembled into one immutable snapshot.

pub mod addressing;
pub mod assembler;
pub mod config;
pub mod error;
pub mod node;
pub mod topology;

pub use addressing::{PodCidr, TunnelAddressing};
pub use assembler::{
    publish, published, AssemblyError, AssemblyState, CompletedNodeNetworkConfiguration,
    ConfigurationAssembler, NodeNetworkConfiguration, Step,
};
pub use config::Settings;
pub use error::{NetconfError, Result};
pub use node::{KubeNodeFetcher, NodeRecord, NodeSource};
pub use topology::{HostNetwork, NetlinkHost, TopologyProbe};
