//! rtnetlink backend for [`HostNetwork`]
//!
//! Links, addresses and neighbours are read with dump requests. The route
//! lookup is a single `RTM_GETROUTE` for one destination, which the kernel
//! answers with the one route it would use, as `ip route get` does.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use ipnet::Ipv4Net;
use netlink_packet_core::{NetlinkMessage, NetlinkPayload, NLM_F_REQUEST};
use netlink_packet_route::address::nlas::Nla as AddressNla;
use netlink_packet_route::link::nlas::Nla as LinkNla;
use netlink_packet_route::neighbour::nlas::Nla as NeighbourNla;
use netlink_packet_route::route::nlas::Nla as RouteNla;
use netlink_packet_route::{RouteMessage, RtnlMessage, AF_INET};
use rtnetlink::IpVersion;
use std::net::Ipv4Addr;
use tracing::trace;

use super::probe::HostNetwork;
use super::types::{LinkInfo, MacAddr, NeighbourEntry, RouteEntry};
use crate::error::{NetconfError, Result};

/// Host tables read over rtnetlink.
///
/// Holds one connection for the lifetime of the value; every method is a
/// read-only request.
pub struct NetlinkHost {
    handle: rtnetlink::Handle,
    // Keep the connection task alive
    _conn_task: tokio::task::JoinHandle<()>,
}

impl NetlinkHost {
    /// Open a netlink connection. Must be called inside a tokio runtime.
    pub fn new() -> Result<Self> {
        let (conn, handle, _) = rtnetlink::new_connection()
            .map_err(|e| NetconfError::lookup("open netlink socket", e))?;
        let conn_task = tokio::spawn(conn);
        Ok(Self {
            handle,
            _conn_task: conn_task,
        })
    }
}

fn ipv4_from_bytes(bytes: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = bytes.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

/// Build a non-dump `RTM_GETROUTE` for a single destination.
///
/// `RouteGetRequest::execute` always adds `NLM_F_DUMP`, which makes the
/// kernel ignore the destination and return the whole table.
fn route_lookup_request(destination: Ipv4Addr) -> NetlinkMessage<RtnlMessage> {
    let mut message = RouteMessage::default();
    message.header.address_family = AF_INET as u8;
    message.header.destination_prefix_length = 32;
    message
        .nlas
        .push(RouteNla::Destination(destination.octets().to_vec()));

    let mut request = NetlinkMessage::from(RtnlMessage::GetRoute(message));
    request.header.flags = NLM_F_REQUEST;
    request
}

fn route_entry(route: &RouteMessage) -> RouteEntry {
    let mut entry = RouteEntry {
        gateway: None,
        output_interface: None,
    };
    for nla in &route.nlas {
        match nla {
            RouteNla::Gateway(bytes) => entry.gateway = ipv4_from_bytes(bytes),
            RouteNla::Oif(index) => entry.output_interface = Some(*index),
            _ => {}
        }
    }
    entry
}

#[async_trait]
impl HostNetwork for NetlinkHost {
    async fn links(&self) -> Result<Vec<LinkInfo>> {
        let mut links = self.handle.link().get().execute();
        let mut result = Vec::new();

        while let Some(msg) = links
            .try_next()
            .await
            .map_err(|e| NetconfError::lookup("list links", e))?
        {
            let name = msg.nlas.iter().find_map(|nla| match nla {
                LinkNla::IfName(name) => Some(name.clone()),
                _ => None,
            });
            result.push(LinkInfo {
                index: msg.header.index,
                name: name.unwrap_or_default(),
            });
        }

        Ok(result)
    }

    async fn ipv4_addresses(&self, link_index: u32) -> Result<Vec<Ipv4Net>> {
        let mut addrs = self
            .handle
            .address()
            .get()
            .set_link_index_filter(link_index)
            .execute();
        let mut result = Vec::new();

        while let Some(msg) = addrs
            .try_next()
            .await
            .map_err(|e| NetconfError::lookup("list interface addresses", e))?
        {
            if msg.header.family != AF_INET as u8 || msg.header.index != link_index {
                continue;
            }

            // IFA_LOCAL is the interface's own address; IFA_ADDRESS only
            // differs from it on point-to-point links.
            let local = msg.nlas.iter().find_map(|nla| match nla {
                AddressNla::Local(bytes) => ipv4_from_bytes(bytes),
                _ => None,
            });
            let address = local.or_else(|| {
                msg.nlas.iter().find_map(|nla| match nla {
                    AddressNla::Address(bytes) => ipv4_from_bytes(bytes),
                    _ => None,
                })
            });

            if let Some(addr) = address {
                let net = Ipv4Net::new(addr, msg.header.prefix_len)
                    .map_err(|e| NetconfError::lookup("list interface addresses", e))?;
                result.push(net);
            }
        }

        trace!(link_index, count = result.len(), "Listed IPv4 addresses");
        Ok(result)
    }

    async fn route_to(&self, destination: Ipv4Addr) -> Result<Vec<RouteEntry>> {
        let mut handle = self.handle.clone();
        let response = handle
            .request(route_lookup_request(destination))
            .map_err(|e| NetconfError::lookup("query routing table", e))?;
        futures::pin_mut!(response);
        let mut result = Vec::new();

        while let Some(msg) = response.next().await {
            match msg.payload {
                NetlinkPayload::InnerMessage(RtnlMessage::NewRoute(route)) => {
                    result.push(route_entry(&route));
                }
                NetlinkPayload::Error(err) => {
                    return Err(NetconfError::lookup(
                        "query routing table",
                        rtnetlink::Error::NetlinkError(err),
                    ));
                }
                _ => {}
            }
        }

        trace!(%destination, count = result.len(), "Looked up route");
        Ok(result)
    }

    async fn ipv4_neighbours(&self, link_index: u32) -> Result<Vec<NeighbourEntry>> {
        let mut neighbours = self
            .handle
            .neighbours()
            .get()
            .set_family(IpVersion::V4)
            .execute();
        let mut result = Vec::new();

        while let Some(msg) = neighbours
            .try_next()
            .await
            .map_err(|e| NetconfError::lookup("list neighbours", e))?
        {
            if msg.header.family != AF_INET as u8 || msg.header.ifindex != link_index {
                continue;
            }

            let mut address = None;
            let mut link_address = None;
            for nla in &msg.nlas {
                match nla {
                    NeighbourNla::Destination(bytes) => address = ipv4_from_bytes(bytes),
                    NeighbourNla::LinkLocalAddress(bytes) => {
                        link_address = MacAddr::from_bytes(bytes)
                    }
                    _ => {}
                }
            }

            if let Some(address) = address {
                result.push(NeighbourEntry {
                    address,
                    link_address,
                });
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_from_bytes() {
        assert_eq!(ipv4_from_bytes(&[10, 0, 0, 1]), Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(ipv4_from_bytes(&[0; 16]), None);
    }

    #[test]
    fn test_route_lookup_is_single_destination_request() {
        use netlink_packet_core::NLM_F_DUMP;

        let request = route_lookup_request(Ipv4Addr::new(1, 0, 0, 0));

        assert_eq!(request.header.flags, NLM_F_REQUEST);
        assert_eq!(request.header.flags & NLM_F_DUMP, 0);

        let NetlinkPayload::InnerMessage(RtnlMessage::GetRoute(route)) = request.payload else {
            panic!("expected an RTM_GETROUTE payload");
        };
        assert_eq!(route.header.address_family, AF_INET as u8);
        assert_eq!(route.header.destination_prefix_length, 32);
        assert_eq!(route.nlas, vec![RouteNla::Destination(vec![1, 0, 0, 0])]);
    }

    #[test]
    fn test_route_entry_reads_gateway_and_oif() {
        let mut route = RouteMessage::default();
        route.nlas.push(RouteNla::Gateway(vec![10, 0, 0, 1]));
        route.nlas.push(RouteNla::Oif(2));

        let entry = route_entry(&route);
        assert_eq!(entry.gateway, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(entry.output_interface, Some(2));

        let on_link = route_entry(&RouteMessage::default());
        assert_eq!(on_link.gateway, None);
        assert_eq!(on_link.output_interface, None);
    }

    #[tokio::test]
    #[ignore] // Requires a Linux host with a default route
    async fn test_default_route_lookup_returns_one_route() {
        let host = NetlinkHost::new().unwrap();
        let routes = host.route_to(Ipv4Addr::new(1, 0, 0, 0)).await.unwrap();
        assert_eq!(routes.len(), 1);
    }

    #[tokio::test]
    #[ignore] // Requires a Linux host with netlink access
    async fn test_loopback_is_listed() {
        let host = NetlinkHost::new().unwrap();
        let links = host.links().await.unwrap();
        let lo = links.iter().find(|l| l.name == "lo").unwrap();

        let addrs = host.ipv4_addresses(lo.index).await.unwrap();
        assert!(addrs.iter().any(|n| n.addr() == Ipv4Addr::LOCALHOST));
    }
}
