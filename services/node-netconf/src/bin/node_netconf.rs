//! Node Netconf - Standalone Binary
//!
//! Resolves the local node's network identity once at startup and prints
//! it. Exits non-zero if any lookup fails, in which case the node must not
//! take part in the overlay.
//!
//! ## Usage
//!
//! ```bash
//! # Inside a DaemonSet pod (NODE_NAME from the downward API)
//! node-netconf
//!
//! # Explicit node and JSON output
//! node-netconf --node-name worker-1 --output json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_netconf::config::{LogFormat, OutputFormat};
use node_netconf::{ConfigurationAssembler, KubeNodeFetcher, NetlinkHost, Settings, TopologyProbe};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();
    init_tracing(settings.log_format);

    info!(
        node = %settings.node_name,
        cluster_cidr = %settings.cluster_cidr,
        tunnel_cidr = %settings.tunnel_cidr,
        "Starting node network resolution"
    );

    let nodes = KubeNodeFetcher::try_default()
        .await
        .context("Failed to create K8s client")?;
    let host = NetlinkHost::new().context("Failed to open netlink connection")?;
    let probe = TopologyProbe::new(host).with_route_probe(settings.route_probe);

    let mut assembler = ConfigurationAssembler::new(
        &settings.node_name,
        nodes,
        probe,
        settings.tunnel_addressing(),
    );

    let config = assembler
        .initialize()
        .await
        .context("Failed to resolve node network configuration")?;

    match settings.output {
        OutputFormat::Text => {
            println!("{}", config.display());
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&*config).context("Failed to serialize configuration")?
            );
        }
    }

    info!(
        node = %config.node.name,
        ready = config.node.is_ready(),
        "Node network configuration published"
    );

    Ok(())
}
