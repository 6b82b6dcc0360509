//! Read-only inspection of the host network
//!
//! Maps the node's InternalIP to a local interface, asks the kernel which
//! route it would use for an external destination, and reads the gateway's
//! MAC from the neighbour cache without triggering ARP.

use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, error};

use super::types::{LinkInfo, MacAddr, NeighbourEntry, NetworkInterface, RouteEntry};
use crate::error::{NetconfError, Result};
use crate::node::NodeRecord;

/// Destination used to make the kernel reveal its default route.
///
/// Only ever used for a table lookup; nothing is sent to it.
pub const DEFAULT_ROUTE_PROBE: Ipv4Addr = Ipv4Addr::new(1, 0, 0, 0);

/// Read access to the host's interface, routing and neighbour tables
#[async_trait]
pub trait HostNetwork: Send + Sync {
    /// All links on the host
    async fn links(&self) -> Result<Vec<LinkInfo>>;

    /// IPv4 networks bound to a link
    async fn ipv4_addresses(&self, link_index: u32) -> Result<Vec<Ipv4Net>>;

    /// Routes the kernel would use to reach `destination`
    async fn route_to(&self, destination: Ipv4Addr) -> Result<Vec<RouteEntry>>;

    /// IPv4 neighbour cache entries of a link.
    ///
    /// Must be a passive read; implementations never trigger resolution.
    async fn ipv4_neighbours(&self, link_index: u32) -> Result<Vec<NeighbourEntry>>;
}

/// Correlates a node's declared address with live host state
pub struct TopologyProbe<H> {
    host: H,
    route_probe: Ipv4Addr,
}

impl<H: HostNetwork> TopologyProbe<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            route_probe: DEFAULT_ROUTE_PROBE,
        }
    }

    /// Override the destination used for default route lookups
    pub fn with_route_probe(mut self, destination: Ipv4Addr) -> Self {
        self.route_probe = destination;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Extract the node's InternalIP
    pub fn extract_internal_ip(&self, node: &NodeRecord) -> Result<IpAddr> {
        match node.internal_ip() {
            Ok(ip) => {
                debug!(node = %node.name, ip = %ip, "Obtained node IP");
                Ok(ip)
            }
            Err(e) => {
                error!(node = %node.name, error = %e, "Failed to obtain node IP");
                Err(e)
            }
        }
    }

    /// Find the interface whose bound IPv4 address equals `ip`
    pub async fn resolve_external_interface(&self, ip: IpAddr) -> Result<NetworkInterface> {
        let links = self.host.links().await.map_err(|e| {
            error!(error = %e, "Failed to retrieve the list of host interfaces");
            e
        })?;

        let target = match ip {
            IpAddr::V4(v4) => v4,
            // Only IPv4 addresses are enumerated, so an IPv6 InternalIP
            // can never match.
            IpAddr::V6(_) => {
                error!(ip = %ip, "No interface for a non-IPv4 node address");
                return Err(NetconfError::InterfaceNotFound(ip));
            }
        };

        for link in links {
            let addrs = self.host.ipv4_addresses(link.index).await.map_err(|e| {
                error!(
                    interface = %link.name,
                    error = %e,
                    "Failed to retrieve interface addresses"
                );
                e
            })?;

            if let Some(network) = addrs.into_iter().find(|n| n.addr() == target) {
                let iface = NetworkInterface {
                    name: link.name,
                    index: link.index,
                    network,
                };
                debug!(
                    interface = %iface.name,
                    index = iface.index,
                    network = %iface.network,
                    "Obtained external interface"
                );
                return Ok(iface);
            }
        }

        error!(ip = %ip, "No interface carries the node IP");
        Err(NetconfError::InterfaceNotFound(ip))
    }

    /// Resolve the default gateway reached through `iface`.
    ///
    /// The route carries no prefix length; the interface's own is used,
    /// assuming the gateway sits on the interface's subnet.
    pub async fn resolve_default_gateway(&self, iface: &NetworkInterface) -> Result<Ipv4Net> {
        let routes = self.host.route_to(self.route_probe).await.map_err(|e| {
            error!(interface = %iface.name, error = %e, "Failed to retrieve the default route");
            e
        })?;

        let route = match routes.as_slice() {
            [] => {
                error!(interface = %iface.name, probe = %self.route_probe, "No default route");
                return Err(NetconfError::NoRoute(self.route_probe));
            }
            [route] => route,
            many => {
                error!(
                    interface = %iface.name,
                    count = many.len(),
                    "Failed to determine a single default route"
                );
                return Err(NetconfError::AmbiguousResult(many.len()));
            }
        };

        let route_index = route.output_interface.unwrap_or(0);
        if route_index != iface.index {
            error!(
                interface = %iface.name,
                route_link_index = route_index,
                iface_link_index = iface.index,
                "Route link index does not match the external interface"
            );
            return Err(NetconfError::InterfaceMismatch {
                route: route_index,
                interface: iface.index,
            });
        }

        let gateway = route.gateway.ok_or_else(|| {
            error!(interface = %iface.name, "Default route has no gateway");
            NetconfError::NoRoute(self.route_probe)
        })?;

        let network = Ipv4Net::new(gateway, iface.prefix_len())
            .map_err(|e| NetconfError::invalid_cidr(gateway.to_string(), e.to_string()))?;

        debug!(interface = %iface.name, gateway = %network, "Obtained default gateway");
        Ok(network)
    }

    /// Look up the gateway's MAC in the interface's neighbour cache
    pub async fn resolve_gateway_mac(
        &self,
        iface: &NetworkInterface,
        gateway: Ipv4Addr,
    ) -> Result<MacAddr> {
        let neighbours = self.host.ipv4_neighbours(iface.index).await.map_err(|e| {
            error!(interface = %iface.name, error = %e, "Failed to retrieve the neighbour list");
            e
        })?;

        let mac = neighbours
            .iter()
            .find(|n| n.address == gateway)
            .and_then(|n| n.link_address);

        match mac {
            Some(mac) => {
                debug!(interface = %iface.name, mac = %mac, "Obtained default gateway MAC");
                Ok(mac)
            }
            None => {
                error!(
                    interface = %iface.name,
                    gateway = %gateway,
                    "No ARP entry for default gateway"
                );
                Err(NetconfError::NoNeighborEntry {
                    interface: iface.name.clone(),
                    address: gateway,
                })
            }
        }
    }
}
