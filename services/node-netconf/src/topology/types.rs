//! Types for host network topology
//!
//! Plain values copied out of the kernel tables, so the probe logic can be
//! exercised without a netlink socket.

use ipnet::Ipv4Net;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Link-layer (MAC) address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Build from a raw attribute payload; anything but 6 bytes is rejected
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(octets))
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| format!("invalid MAC address: {}", s))?;
            if part.len() != 2 {
                return Err(format!("invalid MAC address: {}", s));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| format!("invalid MAC address: {}", s))?;
        }
        if parts.next().is_some() {
            return Err(format!("invalid MAC address: {}", s));
        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A host link as reported by the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub index: u32,
    pub name: String,
}

/// One answer of a routing-table lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Next hop, absent for on-link routes
    pub gateway: Option<Ipv4Addr>,
    /// Egress interface index
    pub output_interface: Option<u32>,
}

/// One IPv4 neighbour (ARP) cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighbourEntry {
    pub address: Ipv4Addr,
    /// Absent while the kernel has not resolved the entry
    pub link_address: Option<MacAddr>,
}

/// A live interface together with one bound IPv4 network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    pub name: String,
    pub index: u32,
    pub network: Ipv4Net,
}

impl NetworkInterface {
    pub fn address(&self) -> Ipv4Addr {
        self.network.addr()
    }

    pub fn prefix_len(&self) -> u8 {
        self.network.prefix_len()
    }
}

/// A fully resolved gateway: address, prefix length and MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatewayInfo {
    pub network: Ipv4Net,
    pub mac: MacAddr,
}

/// A gateway whose MAC is not known yet.
///
/// Becomes a `GatewayInfo` only through `complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingGateway {
    pub network: Ipv4Net,
}

impl PendingGateway {
    pub fn new(network: Ipv4Net) -> Self {
        Self { network }
    }

    pub fn complete(self, mac: MacAddr) -> GatewayInfo {
        GatewayInfo {
            network: self.network,
            mac,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_display_and_parse() {
        let mac = MacAddr([0x02, 0x42, 0xac, 0x11, 0x00, 0x0a]);
        assert_eq!(mac.to_string(), "02:42:ac:11:00:0a");
        assert_eq!("02:42:AC:11:00:0A".parse::<MacAddr>().unwrap(), mac);
    }

    #[test]
    fn test_mac_parse_rejects_garbage() {
        assert!("02:42:ac:11:00".parse::<MacAddr>().is_err());
        assert!("02:42:ac:11:00:0a:ff".parse::<MacAddr>().is_err());
        assert!("02:42:ac:11:00:zz".parse::<MacAddr>().is_err());
        assert!("2:42:ac:11:00:0a".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_from_bytes() {
        assert_eq!(
            MacAddr::from_bytes(&[1, 2, 3, 4, 5, 6]),
            Some(MacAddr([1, 2, 3, 4, 5, 6]))
        );
        assert_eq!(MacAddr::from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn test_mac_serializes_as_string() {
        let json = serde_json::to_string(&MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])).unwrap();
        assert_eq!(json, "\"aa:bb:cc:dd:ee:ff\"");
    }

    #[test]
    fn test_pending_gateway_complete() {
        let network: Ipv4Net = "10.244.3.1/24".parse().unwrap();
        let mac = MacAddr([0, 1, 2, 3, 4, 5]);

        let gw = PendingGateway::new(network).complete(mac);
        assert_eq!(gw.network, network);
        assert_eq!(gw.mac, mac);
    }
}
