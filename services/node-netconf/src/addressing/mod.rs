//! Deterministic overlay address derivation
//!
//! Every address computed here is a pure function of Node data and static
//! cluster settings. Any cluster member can compute any peer's values from
//! the peer's Node object alone, with no discovery exchange.
//!
//! ## Tunnel endpoint layout
//!
//! The cluster pod CIDR is cut into equal node slices of a fixed prefix
//! length (the node CIDR mask size). A node's pod CIDR must be exactly one
//! of those slices. The slice index
//! `i = (pod_network - cluster_network) >> (32 - node_prefix)` selects host
//! `i + 1` of the reserved tunnel block, at the block's prefix length:
//!
//! ```text
//! cluster 10.244.0.0/16, node mask /24, pod 10.244.3.0/24  ->  i = 3
//! tunnel block 10.18.0.0/16                                ->  10.18.0.4/16
//! ```
//!
//! Pod CIDRs with any other prefix length are rejected, since slices of
//! mixed sizes would share indexes. Host 0 (the block's network address)
//! is never used, and a slot landing on the block's broadcast address is
//! rejected.

use ipnet::{IpNet, Ipv4Net};
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, error};

use crate::error::{NetconfError, Result};
use crate::node::NodeRecord;

/// Default cluster-wide pod CIDR
pub const DEFAULT_CLUSTER_CIDR: &str = "10.244.0.0/16";
/// Default block reserved for tunnel endpoints
pub const DEFAULT_TUNNEL_CIDR: &str = "10.18.0.0/16";
/// Default prefix length of every node's pod CIDR
pub const DEFAULT_NODE_CIDR_MASK_SIZE: u8 = 24;

/// The address range assigned to pods on one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PodCidr(Ipv4Net);

impl PodCidr {
    /// Wrap a network, dropping any host bits
    pub fn new(network: Ipv4Net) -> Self {
        Self(network.trunc())
    }

    pub fn network(&self) -> Ipv4Net {
        self.0
    }
}

impl fmt::Display for PodCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cluster ranges the tunnel endpoint layout depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TunnelAddressing {
    /// Range all node pod CIDRs are carved from
    pub cluster_cidr: Ipv4Net,
    /// Range reserved for tunnel endpoints
    pub tunnel_block: Ipv4Net,
    /// Prefix length every node pod CIDR is allocated with
    pub node_prefix_len: u8,
}

impl TunnelAddressing {
    pub fn new(cluster_cidr: Ipv4Net, tunnel_block: Ipv4Net) -> Self {
        Self {
            cluster_cidr: cluster_cidr.trunc(),
            tunnel_block: tunnel_block.trunc(),
            node_prefix_len: DEFAULT_NODE_CIDR_MASK_SIZE,
        }
    }

    pub fn with_node_prefix_len(mut self, node_prefix_len: u8) -> Self {
        self.node_prefix_len = node_prefix_len;
        self
    }
}

impl Default for TunnelAddressing {
    fn default() -> Self {
        Self::new(
            Ipv4Net::new(Ipv4Addr::new(10, 244, 0, 0), 16).unwrap_or_default(),
            Ipv4Net::new(Ipv4Addr::new(10, 18, 0, 0), 16).unwrap_or_default(),
        )
    }
}

/// Parse the node's pod CIDR
pub fn parse_pod_cidr(node: &NodeRecord) -> Result<PodCidr> {
    let raw = match node.pod_cidr.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            error!(node = %node.name, "Node has no pod CIDR");
            return Err(NetconfError::MissingPodCidr(node.name.clone()));
        }
    };

    let network = match raw.parse::<IpNet>() {
        Ok(IpNet::V4(net)) => net,
        Ok(IpNet::V6(_)) => {
            error!(node = %node.name, cidr = %raw, "IPv6 pod CIDR is not supported");
            return Err(NetconfError::invalid_cidr(raw, "IPv6 pod CIDRs are not supported"));
        }
        Err(e) => {
            error!(node = %node.name, cidr = %raw, error = %e, "Failed to parse pod CIDR");
            return Err(NetconfError::invalid_cidr(raw, e.to_string()));
        }
    };

    let cidr = PodCidr::new(network);
    debug!(node = %node.name, pod_cidr = %cidr, "Parsed pod CIDR");
    Ok(cidr)
}

/// The pod-subnet gateway: first usable address of the CIDR, at its prefix
pub fn derive_pod_gateway(cidr: &PodCidr) -> Result<Ipv4Net> {
    let network = cidr.network();
    if network.prefix_len() >= 31 {
        return Err(NetconfError::invalid_cidr(
            network.to_string(),
            "no usable address for a pod gateway",
        ));
    }

    let gateway = Ipv4Addr::from(u32::from(network.network()) + 1);
    Ipv4Net::new(gateway, network.prefix_len())
        .map_err(|e| NetconfError::invalid_cidr(network.to_string(), e.to_string()))
}

/// The node's tunnel endpoint, derived from its pod CIDR slot
pub fn derive_tunnel_endpoint(
    node: &NodeRecord,
    addressing: &TunnelAddressing,
) -> Result<Ipv4Net> {
    let pod = parse_pod_cidr(node)?.network();
    let cluster = addressing.cluster_cidr.trunc();
    let block = addressing.tunnel_block.trunc();
    let node_prefix = addressing.node_prefix_len;

    if node_prefix > 32 || node_prefix < cluster.prefix_len() {
        error!(
            node_prefix,
            cluster_cidr = %cluster,
            "Node CIDR mask size does not fit the cluster CIDR"
        );
        return Err(NetconfError::invalid_cidr(
            cluster.to_string(),
            format!("node CIDR mask size /{} does not fit", node_prefix),
        ));
    }

    if pod.prefix_len() < cluster.prefix_len() || !cluster.contains(&pod.network()) {
        error!(
            node = %node.name,
            pod_cidr = %pod,
            cluster_cidr = %cluster,
            "Pod CIDR outside cluster CIDR"
        );
        return Err(NetconfError::invalid_cidr(
            pod.to_string(),
            format!("not within cluster CIDR {}", cluster),
        ));
    }

    if pod.prefix_len() != node_prefix {
        error!(
            node = %node.name,
            pod_cidr = %pod,
            node_prefix,
            "Pod CIDR does not match the node CIDR mask size"
        );
        return Err(NetconfError::invalid_cidr(
            pod.to_string(),
            format!("expected a /{} node pod CIDR", node_prefix),
        ));
    }

    let offset = u32::from(pod.network()) - u32::from(cluster.network());
    let slot = offset.checked_shr(32 - u32::from(node_prefix)).unwrap_or(0);

    let host = u64::from(slot) + 1;
    let block_size = 1u64 << (32 - u32::from(block.prefix_len()));
    if host >= block_size.saturating_sub(1) {
        error!(node = %node.name, slot, tunnel_block = %block, "Tunnel block exhausted");
        return Err(NetconfError::TunnelBlockExhausted { block, slot });
    }

    // host < 2^32 - 1 here, so the sum stays within the block
    let address = Ipv4Addr::from(u32::from(block.network()) + host as u32);
    let endpoint = Ipv4Net::new(address, block.prefix_len())
        .map_err(|e| NetconfError::invalid_cidr(block.to_string(), e.to_string()))?;

    debug!(node = %node.name, slot, endpoint = %endpoint, "Derived tunnel endpoint");
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with_cidr(cidr: &str) -> NodeRecord {
        NodeRecord::new("worker-1").pod_cidr(cidr)
    }

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn test_default_addressing_matches_constants() {
        let addressing = TunnelAddressing::default();
        assert_eq!(addressing.cluster_cidr, net(DEFAULT_CLUSTER_CIDR));
        assert_eq!(addressing.tunnel_block, net(DEFAULT_TUNNEL_CIDR));
        assert_eq!(addressing.node_prefix_len, DEFAULT_NODE_CIDR_MASK_SIZE);
    }

    #[test]
    fn test_parse_pod_cidr() {
        let cidr = parse_pod_cidr(&node_with_cidr("10.244.3.0/24")).unwrap();
        assert_eq!(cidr.network(), net("10.244.3.0/24"));
    }

    #[test]
    fn test_parse_pod_cidr_truncates_host_bits() {
        let cidr = parse_pod_cidr(&node_with_cidr("10.244.3.7/24")).unwrap();
        assert_eq!(cidr.to_string(), "10.244.3.0/24");
    }

    #[test]
    fn test_parse_pod_cidr_missing() {
        let err = parse_pod_cidr(&NodeRecord::new("worker-1")).unwrap_err();
        assert!(matches!(err, NetconfError::MissingPodCidr(n) if n == "worker-1"));

        let err = parse_pod_cidr(&node_with_cidr("  ")).unwrap_err();
        assert!(matches!(err, NetconfError::MissingPodCidr(_)));
    }

    #[test]
    fn test_parse_pod_cidr_invalid() {
        for bad in ["10.244.3.0", "10.244.3.0/33", "not-a-cidr", "fd00:10:244::/64"] {
            let err = parse_pod_cidr(&node_with_cidr(bad)).unwrap_err();
            assert!(
                matches!(err, NetconfError::InvalidCidr { .. }),
                "{} should be rejected, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_pod_gateway_first_usable_address() {
        let cidr = PodCidr::new(net("10.244.3.0/24"));
        assert_eq!(derive_pod_gateway(&cidr).unwrap(), net("10.244.3.1/24"));

        let cidr = PodCidr::new(net("172.16.128.0/17"));
        assert_eq!(derive_pod_gateway(&cidr).unwrap(), net("172.16.128.1/17"));
    }

    #[test]
    fn test_pod_gateway_rejects_tiny_cidr() {
        for tiny in ["10.0.0.0/31", "10.0.0.4/32"] {
            let err = derive_pod_gateway(&PodCidr::new(net(tiny))).unwrap_err();
            assert!(matches!(err, NetconfError::InvalidCidr { .. }));
        }
    }

    #[test]
    fn test_pod_gateway_is_deterministic() {
        let cidr = PodCidr::new(net("10.244.42.0/24"));
        let first = derive_pod_gateway(&cidr).unwrap();
        for _ in 0..10 {
            assert_eq!(derive_pod_gateway(&cidr).unwrap(), first);
        }
    }

    #[test]
    fn test_tunnel_endpoint_layout() {
        let addressing = TunnelAddressing::default();

        let endpoint = |cidr: &str| derive_tunnel_endpoint(&node_with_cidr(cidr), &addressing);

        assert_eq!(endpoint("10.244.3.0/24").unwrap(), net("10.18.0.4/16"));
        assert_eq!(endpoint("10.244.0.0/24").unwrap(), net("10.18.0.1/16"));
        assert_eq!(endpoint("10.244.255.0/24").unwrap(), net("10.18.1.0/16"));
    }

    #[test]
    fn test_tunnel_endpoint_ignores_node_name() {
        let addressing = TunnelAddressing::default();
        let a = NodeRecord::new("a").pod_cidr("10.244.7.0/24");
        let b = NodeRecord::new("b").pod_cidr("10.244.7.0/24");

        assert_eq!(
            derive_tunnel_endpoint(&a, &addressing).unwrap(),
            derive_tunnel_endpoint(&b, &addressing).unwrap()
        );
    }

    #[test]
    fn test_tunnel_endpoints_are_unique_per_pod_cidr() {
        let addressing = TunnelAddressing::default();
        let mut seen = std::collections::HashSet::new();

        for third in 0..=255u8 {
            let node = node_with_cidr(&format!("10.244.{}.0/24", third));
            let endpoint = derive_tunnel_endpoint(&node, &addressing).unwrap();
            assert!(addressing.tunnel_block.contains(&endpoint.addr()));
            assert!(seen.insert(endpoint.addr()), "duplicate endpoint {}", endpoint);
        }
    }

    #[test]
    fn test_tunnel_endpoint_outside_cluster() {
        let addressing = TunnelAddressing::default();

        for outside in ["10.245.3.0/24", "10.0.0.0/8"] {
            let err = derive_tunnel_endpoint(&node_with_cidr(outside), &addressing).unwrap_err();
            assert!(matches!(err, NetconfError::InvalidCidr { .. }));
        }
    }

    #[test]
    fn test_tunnel_endpoint_rejects_mixed_prefix_lengths() {
        let addressing = TunnelAddressing::default();

        // Slot by own prefix would put both at index 1
        assert_eq!(
            derive_tunnel_endpoint(&node_with_cidr("10.244.1.0/24"), &addressing).unwrap(),
            net("10.18.0.2/16")
        );
        let err = derive_tunnel_endpoint(&node_with_cidr("10.244.0.128/25"), &addressing)
            .unwrap_err();
        assert!(
            matches!(&err, NetconfError::InvalidCidr { cidr, .. } if cidr == "10.244.0.128/25"),
            "got {:?}",
            err
        );
    }

    #[test]
    fn test_tunnel_endpoint_with_configured_node_mask() {
        let addressing = TunnelAddressing::default().with_node_prefix_len(25);
        let endpoint = |cidr: &str| derive_tunnel_endpoint(&node_with_cidr(cidr), &addressing);

        assert_eq!(endpoint("10.244.0.128/25").unwrap(), net("10.18.0.2/16"));
        assert_eq!(endpoint("10.244.1.0/25").unwrap(), net("10.18.0.3/16"));
        assert!(matches!(
            endpoint("10.244.1.0/24").unwrap_err(),
            NetconfError::InvalidCidr { .. }
        ));
    }

    #[test]
    fn test_node_mask_wider_than_cluster_is_rejected() {
        let addressing = TunnelAddressing::default().with_node_prefix_len(8);
        let err = derive_tunnel_endpoint(&node_with_cidr("10.0.0.0/8"), &addressing).unwrap_err();
        assert!(matches!(err, NetconfError::InvalidCidr { .. }));
    }

    #[test]
    fn test_tunnel_block_exhausted() {
        let addressing = TunnelAddressing::new(net("10.244.0.0/16"), net("10.18.0.0/30"));

        // hosts 1 and 2 fit in a /30, slot 2 would land on the broadcast
        assert_eq!(
            derive_tunnel_endpoint(&node_with_cidr("10.244.1.0/24"), &addressing).unwrap(),
            net("10.18.0.2/30")
        );
        let err = derive_tunnel_endpoint(&node_with_cidr("10.244.2.0/24"), &addressing)
            .unwrap_err();
        assert!(matches!(err, NetconfError::TunnelBlockExhausted { slot: 2, .. }));
    }

    #[test]
    fn test_tunnel_endpoint_whole_cluster_slice() {
        // A single node owning the whole cluster range takes slot 0
        let addressing =
            TunnelAddressing::new(net("0.0.0.0/0"), net("10.18.0.0/16")).with_node_prefix_len(0);
        let endpoint = derive_tunnel_endpoint(&node_with_cidr("0.0.0.0/0"), &addressing).unwrap();
        assert_eq!(endpoint, net("10.18.0.1/16"));
    }
}
