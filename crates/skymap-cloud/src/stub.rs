//! In-memory stub driver
//!
//! Backs the engine's tests and the CLI's offline dry-runs: inventory is
//! seeded per alias, creates and destroys mutate the in-memory node set
//! and are recorded for assertions.

use crate::driver::{CloudDriver, DriverCall, DriverOp, QueryKind};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use skymap_core::{DesiredEntry, NodeMap, NodeRecord};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Optimizer = dyn Fn(BTreeMap<String, serde_json::Value>) -> Option<BTreeMap<String, serde_json::Value>>
    + Send
    + Sync;

/// Configurable in-memory [`CloudDriver`]
pub struct StubDriver {
    name: String,
    nodes: Mutex<BTreeMap<String, NodeMap>>,
    failing_aliases: HashSet<String>,
    failing_creates: HashSet<String>,
    unsupported: HashSet<DriverOp>,
    optimizer: Option<Box<Optimizer>>,
    created: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
    queried: Mutex<Vec<QueryKind>>,
    host_counter: AtomicUsize,
}

impl StubDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Mutex::new(BTreeMap::new()),
            failing_aliases: HashSet::new(),
            failing_creates: HashSet::new(),
            unsupported: HashSet::new(),
            optimizer: None,
            created: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
            queried: Mutex::new(Vec::new()),
            host_counter: AtomicUsize::new(1),
        }
    }

    /// Seed the live inventory reported for one alias
    pub fn with_nodes(self, alias: impl Into<String>, nodes: NodeMap) -> Self {
        self.nodes.lock().unwrap().insert(alias.into(), nodes);
        self
    }

    pub fn with_node(self, alias: &str, name: &str, state: &str) -> Self {
        {
            let mut inventory = self.nodes.lock().unwrap();
            inventory
                .entry(alias.to_string())
                .or_default()
                .insert(name.to_string(), NodeRecord::new(format!("i-{name}"), state));
        }
        self
    }

    /// Queries against this alias fail with an API error
    pub fn failing_alias(mut self, alias: impl Into<String>) -> Self {
        self.failing_aliases.insert(alias.into());
        self
    }

    /// Creating this instance name fails with an API error
    pub fn failing_create(mut self, name: impl Into<String>) -> Self {
        self.failing_creates.insert(name.into());
        self
    }

    pub fn without(mut self, op: DriverOp) -> Self {
        self.unsupported.insert(op);
        self
    }

    pub fn with_optimizer<F>(mut self, optimizer: F) -> Self
    where
        F: Fn(BTreeMap<String, serde_json::Value>) -> Option<BTreeMap<String, serde_json::Value>>
            + Send
            + Sync
            + 'static,
    {
        self.optimizer = Some(Box::new(optimizer));
        self
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }

    /// Query kinds this driver has answered, in call order
    pub fn queried(&self) -> Vec<QueryKind> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudDriver for StubDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, op: DriverOp) -> bool {
        if self.unsupported.contains(&op) {
            return false;
        }
        match op {
            DriverOp::OptimizeProviders => self.optimizer.is_some(),
            _ => true,
        }
    }

    async fn query(&self, call: &DriverCall, kind: QueryKind) -> Result<NodeMap> {
        self.queried.lock().unwrap().push(kind);
        if self.failing_aliases.contains(&call.alias) {
            return Err(CloudError::ApiError(format!(
                "stub provider {call} is unreachable"
            )));
        }
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .get(&call.alias)
            .cloned()
            .unwrap_or_default())
    }

    async fn create(&self, call: &DriverCall, entry: &DesiredEntry) -> Result<serde_json::Value> {
        if self.failing_creates.contains(&entry.name) {
            return Err(CloudError::ApiError(format!(
                "stub provider refused to create {}",
                entry.name
            )));
        }
        let host = format!(
            "192.0.2.{}",
            self.host_counter.fetch_add(1, Ordering::SeqCst)
        );
        self.created.lock().unwrap().push(entry.name.clone());
        self.nodes
            .lock()
            .unwrap()
            .entry(call.alias.clone())
            .or_default()
            .insert(
                entry.name.clone(),
                NodeRecord::new(format!("i-{}", entry.name), "running"),
            );
        Ok(serde_json::json!({
            "id": format!("i-{}", entry.name),
            "name": entry.name,
            "state": "running",
            "deploy_kwargs": {"host": host},
        }))
    }

    async fn destroy(&self, call: &DriverCall, name: &str) -> Result<serde_json::Value> {
        self.destroyed.lock().unwrap().push(name.to_string());
        let removed = self
            .nodes
            .lock()
            .unwrap()
            .get_mut(&call.alias)
            .and_then(|nodes| nodes.remove(name))
            .is_some();
        Ok(serde_json::json!({"destroyed": removed, "name": name}))
    }

    fn optimize_providers(
        &self,
        configs: BTreeMap<String, serde_json::Value>,
    ) -> Option<BTreeMap<String, serde_json::Value>> {
        self.optimizer.as_ref().and_then(|f| f(configs))
    }
}
