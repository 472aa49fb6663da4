//! Provider query fanout
//!
//! [`Cloud`] queries every configured (alias, driver) pair for its live
//! node inventory and merges the answers into one [`LiveInventory`]
//! snapshot. Failures are isolated per provider: a driver that is not
//! loaded, does not support the query, or errors outright contributes an
//! empty result instead of aborting its siblings.
//!
//! Snapshots are cached per query kind for the lifetime of one `Cloud`
//! instance, invalidated by passing `cached = false`. Concurrent callers
//! sharing one instance are not a supported scenario; there is no
//! internal locking around the cache.

use crate::driver::{CloudDriver, DriverCall, DriverOp, QueryKind};
use crate::error::Result;
use crate::optimize::optimize_providers;
use crate::registry::ProviderRegistry;
use skymap_core::{LiveInventory, NodeMap};
use skymap_pool::{Interrupt, JobError, WorkItem, WorkerPool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct Cloud {
    registry: ProviderRegistry,
    cache: HashMap<QueryKind, LiveInventory>,
}

impl Cloud {
    pub fn new(mut registry: ProviderRegistry) -> Self {
        registry.filter_unloaded();
        Self {
            registry,
            cache: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn invalidate_cache(&mut self) {
        self.cache.clear();
    }

    /// The query kind actually sent to one driver: unless the caller
    /// pinned a kind, drivers that support the cheap `list_nodes_min`
    /// listing answer that instead.
    fn effective_kind(driver: &Arc<dyn CloudDriver>, kind: QueryKind, pinned: bool) -> QueryKind {
        if !pinned && driver.supports(DriverOp::Query(QueryKind::ListNodesMin)) {
            QueryKind::ListNodesMin
        } else {
            kind
        }
    }

    /// Sequential fanout: one provider at a time, in-process.
    pub async fn map_providers(
        &mut self,
        kind: QueryKind,
        pinned: bool,
        cached: bool,
    ) -> LiveInventory {
        if cached {
            if let Some(snapshot) = self.cache.get(&kind) {
                debug!(%kind, "returning cached provider map");
                return snapshot.clone();
            }
        }

        let mut inventory = LiveInventory::new();
        for (alias, driver_name) in self.registry.pairs() {
            let nodes = match self.registry.driver(&driver_name) {
                Some(driver) => {
                    let effective = Self::effective_kind(&driver, kind, pinned);
                    Self::query_one(&driver, &DriverCall::new(&alias, &driver_name), effective)
                        .await
                }
                None => {
                    error!(driver = driver_name.as_str(), "cloud driver is not available");
                    NodeMap::new()
                }
            };
            inventory.insert(alias, driver_name, nodes);
        }

        self.cache.insert(kind, inventory.clone());
        inventory
    }

    /// Parallel fanout through the worker pool, bounded at
    /// `min(providers, 10)` workers.
    pub async fn map_providers_parallel(
        &mut self,
        kind: QueryKind,
        pinned: bool,
        cached: bool,
        interrupt: &Interrupt,
    ) -> Result<LiveInventory> {
        if cached {
            if let Some(snapshot) = self.cache.get(&kind) {
                debug!(%kind, "returning cached provider map");
                return Ok(snapshot.clone());
            }
        }

        let mut inventory = LiveInventory::new();
        let mut items = Vec::new();
        let mut identities: HashMap<String, (String, String)> = HashMap::new();

        let optimized = optimize_providers(&self.registry);
        for (alias, drivers) in optimized {
            for (driver_name, _config) in drivers {
                let Some(driver) = self.registry.driver(&driver_name) else {
                    error!(driver = driver_name.as_str(), "cloud driver is not available");
                    inventory.insert(alias.clone(), driver_name, NodeMap::new());
                    continue;
                };
                let effective = Self::effective_kind(&driver, kind, pinned);
                let call = DriverCall::new(&alias, &driver_name);
                let key = call.to_string();
                identities.insert(key.clone(), (alias.clone(), driver_name.clone()));
                items.push(WorkItem::new(key, async move {
                    let nodes = Self::query_one(&driver, &call, effective).await;
                    serde_json::to_value(nodes)
                        .map_err(|err| JobError::failed("SerializeError", err))
                }));
            }
        }

        if items.is_empty() {
            return Ok(inventory);
        }

        let pool = WorkerPool::for_queries(items.len());
        let results = pool.run_batch(items, interrupt).await?;
        for (key, payload) in results {
            let Some((alias, driver_name)) = identities.remove(&key) else {
                continue;
            };
            let nodes: NodeMap = serde_json::from_value(payload)?;
            inventory.insert(alias, driver_name, nodes);
        }

        self.cache.insert(kind, inventory.clone());
        Ok(inventory)
    }

    /// Restrict the fanout result to the given instance names.
    ///
    /// The ec2 and aws drivers front the same service; an instance
    /// already matched under one is suppressed under the other so it is
    /// not reported twice.
    pub async fn get_running_by_names(
        &mut self,
        names: &[String],
        kind: QueryKind,
        cached: bool,
        interrupt: &Interrupt,
    ) -> Result<LiveInventory> {
        let mapped = self
            .map_providers_parallel(kind, false, cached, interrupt)
            .await?;

        let mut matches = LiveInventory::new();
        let mut matched: HashMap<&str, Vec<String>> = HashMap::new();
        for (alias, drivers) in &mapped.providers {
            for (driver, vms) in drivers {
                for (vm_name, details) in vms {
                    if !names.iter().any(|n| n == vm_name) {
                        continue;
                    }
                    let twin = match driver.as_str() {
                        "ec2" => Some("aws"),
                        "aws" => Some("ec2"),
                        _ => None,
                    };
                    if let Some(twin) = twin {
                        if matched.get(twin).is_some_and(|seen| seen.contains(vm_name)) {
                            debug!(
                                name = vm_name.as_str(),
                                driver = driver.as_str(),
                                "already matched under the twin driver, skipping"
                            );
                            continue;
                        }
                    }
                    matches
                        .providers
                        .entry(alias.clone())
                        .or_default()
                        .entry(driver.clone())
                        .or_default()
                        .insert(vm_name.clone(), details.clone());
                    match driver.as_str() {
                        "ec2" => matched.entry("ec2").or_default().push(vm_name.clone()),
                        "aws" => matched.entry("aws").or_default().push(vm_name.clone()),
                        _ => {}
                    }
                }
            }
        }
        Ok(matches)
    }

    /// Run one provider query, downgrading any failure to an empty
    /// result. Provider trouble must never abort a fanout pass.
    async fn query_one(
        driver: &Arc<dyn CloudDriver>,
        call: &DriverCall,
        kind: QueryKind,
    ) -> NodeMap {
        if !driver.supports(DriverOp::Query(kind)) {
            debug!(%call, %kind, "driver does not support this query, recording empty result");
            return NodeMap::new();
        }
        match driver.query(call, kind).await {
            Ok(nodes) => {
                info!(%call, count = nodes.len(), "provider answered inventory query");
                nodes
            }
            Err(err) => {
                debug!(
                    %call, %kind, error = %err,
                    "failed to execute query while listing nodes, recording empty result"
                );
                NodeMap::new()
            }
        }
    }
}
