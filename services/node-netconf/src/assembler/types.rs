//! Types produced by the configuration assembler

use ipnet::Ipv4Net;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::addressing::PodCidr;
use crate::error::NetconfError;
use crate::node::NodeRecord;
use crate::topology::{GatewayInfo, MacAddr, NetworkInterface, PendingGateway};

/// Network identity of the local node, as handed to the dataplane.
///
/// The pod gateway MAC is still unknown at this stage; see `complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeNetworkConfiguration {
    pub node: NodeRecord,
    pub pod_cidr: PodCidr,
    pub pod_gateway: PendingGateway,
    pub external_interface: NetworkInterface,
    pub tunnel_endpoint: Ipv4Net,
    pub node_gateway: GatewayInfo,
}

impl NodeNetworkConfiguration {
    /// Attach the pod gateway MAC once the dataplane has created it.
    ///
    /// Returns a new value; the provisional configuration is left as is.
    pub fn complete(&self, pod_gateway_mac: MacAddr) -> CompletedNodeNetworkConfiguration {
        CompletedNodeNetworkConfiguration {
            node: self.node.clone(),
            pod_cidr: self.pod_cidr,
            pod_gateway: self.pod_gateway.complete(pod_gateway_mac),
            external_interface: self.external_interface.clone(),
            tunnel_endpoint: self.tunnel_endpoint,
            node_gateway: self.node_gateway,
        }
    }

    /// Format the configuration for display
    pub fn display(&self) -> String {
        format!(
            "Node Network Configuration:\n  Node: {} (ready: {})\n  Pod CIDR: {}\n  Pod Gateway: {} (MAC pending)\n  External Interface: {} (index {}) {}\n  Tunnel Endpoint: {}\n  Node Gateway: {} ({})",
            self.node.name,
            self.node.is_ready(),
            self.pod_cidr,
            self.pod_gateway.network,
            self.external_interface.name,
            self.external_interface.index,
            self.external_interface.network,
            self.tunnel_endpoint,
            self.node_gateway.network,
            self.node_gateway.mac,
        )
    }
}

/// Configuration whose pod gateway is fully resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedNodeNetworkConfiguration {
    pub node: NodeRecord,
    pub pod_cidr: PodCidr,
    pub pod_gateway: GatewayInfo,
    pub external_interface: NetworkInterface,
    pub tunnel_endpoint: Ipv4Net,
    pub node_gateway: GatewayInfo,
}

/// One step of the assembly pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Step {
    FetchNode,
    ParsePodCidr,
    DerivePodGateway,
    ResolveExternalInterface,
    DeriveTunnelEndpoint,
    ResolveNodeGateway,
    ResolveNodeGatewayMac,
    Publish,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::FetchNode => "fetch-node",
            Step::ParsePodCidr => "parse-pod-cidr",
            Step::DerivePodGateway => "derive-pod-gateway",
            Step::ResolveExternalInterface => "resolve-external-interface",
            Step::DeriveTunnelEndpoint => "derive-tunnel-endpoint",
            Step::ResolveNodeGateway => "resolve-node-gateway",
            Step::ResolveNodeGatewayMac => "resolve-node-gateway-mac",
            Step::Publish => "publish",
        };
        write!(f, "{}", name)
    }
}

/// Progress of one assembly run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyState {
    Uninitialized,
    Running(Step),
    Ready,
    Failed { step: Step, cause: String },
}

impl AssemblyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssemblyState::Ready | AssemblyState::Failed { .. })
    }
}

/// A pipeline failure, tagged with the step that raised it
#[derive(Debug, Error)]
#[error("Node network configuration failed at step {step}: {source}")]
pub struct AssemblyError {
    pub step: Step,
    #[source]
    pub source: NetconfError,
}
