//! Provider-reported node inventory
//!
//! A [`NodeRecord`] is one row of a provider listing. Records are rebuilt
//! on every query and never mutated afterwards; the snapshot they belong
//! to is owned by a single planning pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One instance as reported by a cloud driver listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Provider-side instance id
    pub id: String,

    /// Provider-side state string ("running", "terminated", ...)
    pub state: String,

    #[serde(default)]
    pub public_ips: Vec<String>,

    #[serde(default)]
    pub private_ips: Vec<String>,

    /// Driver-specific extra fields
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: state.into(),
            ..Self::default()
        }
    }

    /// Terminated instances are fair game for re-creation
    pub fn is_terminated(&self) -> bool {
        self.state.eq_ignore_ascii_case("terminated")
    }
}

/// Instance name to record, for one (alias, driver) pair
pub type NodeMap = BTreeMap<String, NodeRecord>;

/// Full fanout snapshot: alias -> driver -> instance name -> record
///
/// Built fresh per fanout call. May be cached for the duration of one
/// orchestrator instance only, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveInventory {
    pub providers: BTreeMap<String, BTreeMap<String, NodeMap>>,
}

impl LiveInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, alias: impl Into<String>, driver: impl Into<String>, nodes: NodeMap) {
        self.providers
            .entry(alias.into())
            .or_default()
            .insert(driver.into(), nodes);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Iterate every (alias, driver, name, record) tuple in the snapshot
    pub fn iter_nodes(&self) -> impl Iterator<Item = (&str, &str, &str, &NodeRecord)> {
        self.providers.iter().flat_map(|(alias, drivers)| {
            drivers.iter().flat_map(move |(driver, nodes)| {
                nodes.iter().map(move |(name, record)| {
                    (alias.as_str(), driver.as_str(), name.as_str(), record)
                })
            })
        })
    }

    /// Collect the state every driver reports for a given instance name.
    ///
    /// More than one driver can report the same name (ec2/aws being the
    /// notorious pair); the caller decides what a conflict means.
    pub fn states_by_name(&self, name: &str) -> BTreeMap<String, String> {
        let mut matches = BTreeMap::new();
        for (_alias, driver, vm_name, record) in self.iter_nodes() {
            if vm_name == name && !matches.contains_key(driver) {
                matches.insert(driver.to_string(), record.state.clone());
            }
        }
        matches
    }

    pub fn get(&self, alias: &str, driver: &str) -> Option<&NodeMap> {
        self.providers.get(alias).and_then(|d| d.get(driver))
    }
}
