//! Host Network Topology Probe
//!
//! Maps the node's declared InternalIP to the live interface carrying it,
//! then resolves that interface's default gateway address and MAC.
//!
//! ## Sources
//!
//! - **Interfaces**: link dump plus per-link IPv4 address dump
//! - **Default gateway**: a single routing-table lookup for a well-known
//!   external destination, so the kernel reveals its current default route
//! - **Gateway MAC**: the interface's IPv4 neighbour cache, read passively
//!
//! The OS side sits behind the `HostNetwork` trait; `NetlinkHost` is the
//! rtnetlink implementation.

mod netlink;
mod probe;
mod types;

pub use netlink::NetlinkHost;
pub use probe::{HostNetwork, TopologyProbe, DEFAULT_ROUTE_PROBE};
pub use types::{
    GatewayInfo, LinkInfo, MacAddr, NeighbourEntry, NetworkInterface, PendingGateway, RouteEntry,
};

#[cfg(test)]
pub(crate) use probe::testing;
