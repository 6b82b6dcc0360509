//! Node Network Configuration Assembler
//!
//! Runs node lookup, address derivation and topology probing as one
//! fail-fast sequence and hands out a single immutable snapshot:
//!
//! 1. Fetch the Node record
//! 2. Parse its pod CIDR
//! 3. Derive the pod gateway (MAC left pending)
//! 4. Resolve the external interface from the InternalIP
//! 5. Derive the tunnel endpoint
//! 6. Resolve the node's default gateway
//! 7. Resolve the default gateway MAC
//! 8. Publish
//!
//! Every step only reads, so a failed run needs no cleanup and a new run
//! can simply be started.

mod types;

pub use types::{
    AssemblyError, AssemblyState, CompletedNodeNetworkConfiguration, NodeNetworkConfiguration, Step,
};

use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info};

use crate::addressing::{self, TunnelAddressing};
use crate::error::{NetconfError, Result};
use crate::node::NodeSource;
use crate::topology::{GatewayInfo, HostNetwork, PendingGateway, TopologyProbe};

static PUBLISHED: OnceLock<Arc<NodeNetworkConfiguration>> = OnceLock::new();

/// Store the process-wide configuration. Only the first call succeeds.
pub fn publish(config: Arc<NodeNetworkConfiguration>) -> Result<()> {
    PUBLISHED
        .set(config)
        .map_err(|_| NetconfError::AlreadyPublished)
}

/// The process-wide configuration, once published
pub fn published() -> Option<Arc<NodeNetworkConfiguration>> {
    PUBLISHED.get().cloned()
}

fn failed_at(step: Step) -> impl FnOnce(NetconfError) -> AssemblyError {
    move |source| AssemblyError { step, source }
}

/// Builds the local node's network configuration
pub struct ConfigurationAssembler<N, H> {
    node_name: String,
    nodes: N,
    probe: TopologyProbe<H>,
    addressing: TunnelAddressing,
    state: AssemblyState,
    steps: Vec<Step>,
}

impl<N: NodeSource, H: HostNetwork> ConfigurationAssembler<N, H> {
    pub fn new(
        node_name: impl Into<String>,
        nodes: N,
        probe: TopologyProbe<H>,
        addressing: TunnelAddressing,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            nodes,
            probe,
            addressing,
            state: AssemblyState::Uninitialized,
            steps: Vec::new(),
        }
    }

    /// State reached by the latest run
    pub fn state(&self) -> &AssemblyState {
        &self.state
    }

    /// Steps entered by the latest run, in order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn node_source(&self) -> &N {
        &self.nodes
    }

    pub fn probe(&self) -> &TopologyProbe<H> {
        &self.probe
    }

    /// Run the whole pipeline once and return the resulting snapshot
    pub async fn assemble(
        &mut self,
    ) -> std::result::Result<Arc<NodeNetworkConfiguration>, AssemblyError> {
        let config = self.resolve().await?;
        self.ready(&config);
        Ok(config)
    }

    /// Assemble, then install the result as the process-wide configuration
    pub async fn initialize(
        &mut self,
    ) -> std::result::Result<Arc<NodeNetworkConfiguration>, AssemblyError> {
        let config = self.resolve().await?;

        self.enter(Step::Publish);
        if let Err(e) = publish(Arc::clone(&config)) {
            return Err(self.fail(failed_at(Step::Publish)(e)));
        }

        self.ready(&config);
        Ok(config)
    }

    async fn resolve(
        &mut self,
    ) -> std::result::Result<Arc<NodeNetworkConfiguration>, AssemblyError> {
        self.state = AssemblyState::Uninitialized;
        self.steps.clear();
        info!(node = %self.node_name, "Resolving node network configuration");

        match self.run().await {
            Ok(config) => Ok(config),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn ready(&mut self, config: &NodeNetworkConfiguration) {
        self.state = AssemblyState::Ready;
        info!(
            node = %config.node.name,
            interface = %config.external_interface.name,
            tunnel_endpoint = %config.tunnel_endpoint,
            "Node network configuration ready"
        );
    }

    fn enter(&mut self, step: Step) {
        debug!(node = %self.node_name, step = %step, "Entering step");
        self.state = AssemblyState::Running(step);
        self.steps.push(step);
    }

    fn fail(&mut self, err: AssemblyError) -> AssemblyError {
        error!(
            node = %self.node_name,
            step = %err.step,
            error = %err.source,
            "Failed to resolve node network configuration"
        );
        self.state = AssemblyState::Failed {
            step: err.step,
            cause: err.source.to_string(),
        };
        err
    }

    async fn run(
        &mut self,
    ) -> std::result::Result<Arc<NodeNetworkConfiguration>, AssemblyError> {
        self.enter(Step::FetchNode);
        let node = self
            .nodes
            .fetch(&self.node_name)
            .await
            .map_err(failed_at(Step::FetchNode))?;

        self.enter(Step::ParsePodCidr);
        let pod_cidr = addressing::parse_pod_cidr(&node).map_err(failed_at(Step::ParsePodCidr))?;

        self.enter(Step::DerivePodGateway);
        let pod_gateway = addressing::derive_pod_gateway(&pod_cidr)
            .map(PendingGateway::new)
            .map_err(failed_at(Step::DerivePodGateway))?;

        self.enter(Step::ResolveExternalInterface);
        let internal_ip = self
            .probe
            .extract_internal_ip(&node)
            .map_err(failed_at(Step::ResolveExternalInterface))?;
        let external_interface = self
            .probe
            .resolve_external_interface(internal_ip)
            .await
            .map_err(failed_at(Step::ResolveExternalInterface))?;

        self.enter(Step::DeriveTunnelEndpoint);
        let tunnel_endpoint = addressing::derive_tunnel_endpoint(&node, &self.addressing)
            .map_err(failed_at(Step::DeriveTunnelEndpoint))?;

        self.enter(Step::ResolveNodeGateway);
        let gateway = self
            .probe
            .resolve_default_gateway(&external_interface)
            .await
            .map_err(failed_at(Step::ResolveNodeGateway))?;

        self.enter(Step::ResolveNodeGatewayMac);
        let mac = self
            .probe
            .resolve_gateway_mac(&external_interface, gateway.addr())
            .await
            .map_err(failed_at(Step::ResolveNodeGatewayMac))?;

        Ok(Arc::new(NodeNetworkConfiguration {
            node,
            pod_cidr,
            pod_gateway,
            external_interface,
            tunnel_endpoint,
            node_gateway: GatewayInfo { network: gateway, mac },
        }))
    }
}
