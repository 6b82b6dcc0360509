//! Types describing a cluster Node
//!
//! `NodeRecord` is an owned snapshot of the few Node fields the resolver
//! reads, decoupled from the generated Kubernetes API types.

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::{NetconfError, Result};

/// Address type of the node's cluster-internal address
pub const INTERNAL_IP: &str = "InternalIP";
/// Condition type reported once the kubelet is healthy
pub const READY_CONDITION: &str = "Ready";
const CONDITION_TRUE: &str = "True";

/// A (type, address) pair from `status.addresses`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub address_type: String,
    pub address: String,
}

/// A (type, status) pair from `status.conditions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCondition {
    pub condition_type: String,
    pub status: String,
}

/// Immutable snapshot of a cluster Node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub addresses: Vec<NodeAddress>,
    pub conditions: Vec<NodeCondition>,
    pub pod_cidr: Option<String>,
}

impl NodeRecord {
    /// Create an empty record for the named node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addresses: Vec::new(),
            conditions: Vec::new(),
            pod_cidr: None,
        }
    }

    /// Add a reported address
    pub fn address(mut self, address_type: impl Into<String>, address: impl Into<String>) -> Self {
        self.addresses.push(NodeAddress {
            address_type: address_type.into(),
            address: address.into(),
        });
        self
    }

    /// Add a reported condition
    pub fn condition(
        mut self,
        condition_type: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        self.conditions.push(NodeCondition {
            condition_type: condition_type.into(),
            status: status.into(),
        });
        self
    }

    /// Set the pod CIDR
    pub fn pod_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.pod_cidr = Some(cidr.into());
        self
    }

    /// The first address of type InternalIP, parsed.
    ///
    /// Only the first InternalIP entry is considered; an unparsable one is an
    /// error rather than a reason to look further.
    pub fn internal_ip(&self) -> Result<IpAddr> {
        let entry = self
            .addresses
            .iter()
            .find(|a| a.address_type == INTERNAL_IP)
            .ok_or_else(|| NetconfError::NoAddress(self.name.clone()))?;

        entry.address.parse().map_err(|_| NetconfError::Parse {
            node: self.name.clone(),
            address: entry.address.clone(),
        })
    }

    /// True iff a Ready condition has status True
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition_type == READY_CONDITION && c.status == CONDITION_TRUE)
    }
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        let status = node.status.as_ref();

        let addresses = status
            .and_then(|s| s.addresses.as_ref())
            .map(|addrs| {
                addrs
                    .iter()
                    .map(|a| NodeAddress {
                        address_type: a.type_.clone(),
                        address: a.address.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let conditions = status
            .and_then(|s| s.conditions.as_ref())
            .map(|conds| {
                conds
                    .iter()
                    .map(|c| NodeCondition {
                        condition_type: c.type_.clone(),
                        status: c.status.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        // spec.podCIDR is the primary range; podCIDRs only matters on
        // clusters that never set the singular field.
        let pod_cidr = node.spec.as_ref().and_then(|spec| {
            spec.pod_cidr
                .clone()
                .or_else(|| spec.pod_cidrs.as_ref().and_then(|c| c.first().cloned()))
        });

        Self {
            name: node.name_any(),
            addresses,
            conditions,
            pod_cidr,
        }
    }
}
