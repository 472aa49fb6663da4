//! Cloud driver trait definition

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skymap_core::{DesiredEntry, NodeMap};
use std::collections::BTreeMap;
use std::fmt;

/// The inventory listing flavors a driver may answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    ListNodes,
    ListNodesFull,
    ListNodesSelect,
    /// Cheapest listing, preferred for reconciliation scans when the
    /// driver supports it
    ListNodesMin,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryKind::ListNodes => "list_nodes",
            QueryKind::ListNodesFull => "list_nodes_full",
            QueryKind::ListNodesSelect => "list_nodes_select",
            QueryKind::ListNodesMin => "list_nodes_min",
        };
        f.write_str(name)
    }
}

/// Operations a driver may or may not support.
///
/// Absence of a capability is never an error, merely "skip this provider
/// for that operation".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Query(QueryKind),
    Create,
    Destroy,
    OptimizeProviders,
}

impl fmt::Display for DriverOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverOp::Query(kind) => write!(f, "{kind}"),
            DriverOp::Create => f.write_str("create"),
            DriverOp::Destroy => f.write_str("destroy"),
            DriverOp::OptimizeProviders => f.write_str("optimize_providers"),
        }
    }
}

/// The provider identity for one driver call.
///
/// Threaded explicitly into every call so a driver knows which configured
/// alias it is acting for, without any process-global "active provider"
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverCall {
    pub alias: String,
    pub driver: String,
}

impl DriverCall {
    pub fn new(alias: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            driver: driver.into(),
        }
    }
}

impl fmt::Display for DriverCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.alias, self.driver)
    }
}

/// Cloud backend abstraction
///
/// One implementation per driver name (ec2, azure, proxmox, ...), bound
/// to zero or more configured aliases through the registry.
#[async_trait]
pub trait CloudDriver: Send + Sync {
    /// Driver name as referenced by provider configs (e.g. "ec2")
    fn name(&self) -> &str;

    /// Capability probe. The default claims the basic lifecycle
    /// operations and declines batched-config optimization.
    fn supports(&self, op: DriverOp) -> bool {
        !matches!(op, DriverOp::OptimizeProviders)
    }

    /// List the instances currently known to the provider
    async fn query(&self, call: &DriverCall, kind: QueryKind) -> Result<NodeMap>;

    /// Provision one instance; the returned payload is driver-specific
    /// but should expose the reachable host of the new instance
    async fn create(&self, call: &DriverCall, entry: &DesiredEntry) -> Result<serde_json::Value>;

    /// Tear down one instance by name
    async fn destroy(&self, call: &DriverCall, name: &str) -> Result<serde_json::Value>;

    /// Consolidate the configs of every alias bound to this driver
    /// (e.g. identical credentials answering once for many aliases).
    /// `None` means "no optimization", and the input is used unchanged.
    fn optimize_providers(
        &self,
        configs: BTreeMap<String, serde_json::Value>,
    ) -> Option<BTreeMap<String, serde_json::Value>> {
        let _ = configs;
        None
    }
}
