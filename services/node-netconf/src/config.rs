//! Runtime settings
//!
//! Every flag can also be supplied through the environment, which is how
//! the agent is configured when it runs as a DaemonSet pod.

use clap::{Parser, ValueEnum};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use crate::addressing::{
    TunnelAddressing, DEFAULT_CLUSTER_CIDR, DEFAULT_NODE_CIDR_MASK_SIZE, DEFAULT_TUNNEL_CIDR,
};

/// Node Netconf - resolve the local node's overlay network identity
#[derive(Parser, Debug, Clone)]
#[command(name = "node-netconf", version, about)]
pub struct Settings {
    /// Name of the local cluster node
    #[arg(long, env = "NODE_NAME")]
    pub node_name: String,

    /// Cluster-wide pod CIDR all node pod CIDRs are carved from
    #[arg(long, env = "CLUSTER_CIDR", default_value = DEFAULT_CLUSTER_CIDR)]
    pub cluster_cidr: Ipv4Net,

    /// Address block reserved for tunnel endpoints
    #[arg(long, env = "VTEP_CIDR", default_value = DEFAULT_TUNNEL_CIDR)]
    pub tunnel_cidr: Ipv4Net,

    /// Prefix length of every node's pod CIDR
    #[arg(
        long,
        env = "NODE_CIDR_MASK_SIZE",
        default_value_t = DEFAULT_NODE_CIDR_MASK_SIZE,
        value_parser = clap::value_parser!(u8).range(0..=32)
    )]
    pub node_cidr_mask_size: u8,

    /// Destination looked up to find the default route
    #[arg(long, env = "ROUTE_PROBE_ADDR", default_value = "1.0.0.0")]
    pub route_probe: Ipv4Addr,

    /// Output format for the resolved configuration
    #[arg(long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Log format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain text lines
    Text,
    /// One JSON object per line
    Json,
}

impl Settings {
    pub fn tunnel_addressing(&self) -> TunnelAddressing {
        TunnelAddressing::new(self.cluster_cidr, self.tunnel_cidr)
            .with_node_prefix_len(self.node_cidr_mask_size)
    }
}
