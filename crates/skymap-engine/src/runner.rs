//! Map execution
//!
//! [`MapRunner`] owns one full run: plan the map against live inventory,
//! bootstrap a new master first when one is flagged, provision the
//! remaining entries sequentially or in level-ordered parallel batches,
//! tear down unclaimed instances on hard maps, and dispatch the optional
//! post-creation action. Per-entry provisioning failures are recorded in
//! the aggregate output; only master failures and batch-level trouble
//! abort the run.

use crate::action::ActionRunner;
use crate::deps;
use crate::error::{EngineError, Result};
use crate::keys::{AmbiguityResolver, KeyCleanup, KeyPair, KeyStore};
use crate::reconcile;
use serde_json::{json, Value};
use skymap_cloud::{Cloud, CloudDriver, CloudError, DriverCall, DriverOp, QueryKind};
use skymap_core::{DesiredEntry, ExecutionPlan, ProfileRegistry, RenderedMap, RunOptions};
use skymap_pool::{Interrupt, PoolError, WorkItem, WorkerPool};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct MapRunner {
    cloud: Cloud,
    options: RunOptions,
    profiles: ProfileRegistry,
    rendered: RenderedMap,
    key_store: KeyStore,
    action_runner: Option<Arc<dyn ActionRunner>>,
    ambiguity: Option<AmbiguityResolver>,
    interrupt: Interrupt,
}

impl MapRunner {
    pub fn new(
        cloud: Cloud,
        options: RunOptions,
        profiles: ProfileRegistry,
        rendered: RenderedMap,
    ) -> Self {
        let key_store = KeyStore::new(&options.pki_dir);
        Self {
            cloud,
            options,
            profiles,
            rendered,
            key_store,
            action_runner: None,
            ambiguity: None,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_action_runner(mut self, runner: Arc<dyn ActionRunner>) -> Self {
        self.action_runner = Some(runner);
        self
    }

    pub fn with_ambiguity_resolver(mut self, resolver: AmbiguityResolver) -> Self {
        self.ambiguity = Some(resolver);
        self
    }

    /// Cancellation handle shared with the caller (Ctrl-C wiring)
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Plan the map against a fresh (or cached) inventory snapshot
    pub async fn map_data(&mut self) -> Result<ExecutionPlan> {
        let interrupt = self.interrupt.clone();
        let live = self
            .cloud
            .map_providers_parallel(QueryKind::ListNodes, false, self.options.cached, &interrupt)
            .await?;
        reconcile::map_data(
            &self.rendered,
            &self.profiles,
            &self.options,
            self.cloud.registry().providers(),
            &live,
        )
    }

    /// Execute a plan end to end, returning per-instance results
    pub async fn run_map(&mut self, mut plan: ExecutionPlan) -> Result<BTreeMap<String, Value>> {
        if deps::has_loop(&plan) {
            error!("uh-oh, that cloud map has a dependency loop");
            return Err(EngineError::DependencyLoop);
        }
        deps::assign_levels(&mut plan)?;
        let create_levels: Vec<(String, u32)> = plan
            .create
            .iter()
            .map(|(name, entry)| (name.clone(), entry.level))
            .collect();

        let mut output: BTreeMap<String, Value> = BTreeMap::new();

        let masters: Vec<String> = plan
            .create
            .values()
            .filter(|e| e.make_master())
            .map(|e| e.name.clone())
            .collect();
        if masters.len() > 1 {
            return Err(EngineError::MultipleMasters(masters));
        }

        let mut master_host: Option<String> = None;
        let master_finger: Option<String>;

        if let Some(master_name) = masters.first().cloned() {
            let master_keys = KeyPair::generate(self.options.keysize);
            let finger = master_keys.fingerprint();

            // Preseed a keypair for every entry that runs a minion so the
            // new master accepts them without a signing round.
            let mut preseed = serde_json::Map::new();
            for entry in plan.create.values_mut() {
                if !entry.make_minion() {
                    continue;
                }
                let keys = KeyPair::generate(self.options.keysize);
                preseed.insert(minion_id(entry), json!(keys.public));
                entry.set("pub_key", json!(keys.public));
                entry.set("priv_key", json!(keys.private));
            }

            if let Some(mut master_entry) = plan.create.remove(&master_name) {
                master_entry.set("master_pub", json!(master_keys.public));
                master_entry.set("master_pem", json!(master_keys.private));
                master_entry.set("preseed_minion_keys", Value::Object(preseed));
                if master_entry.make_minion() {
                    let minion = master_entry.minion_mut();
                    minion.insert("master".to_string(), json!("127.0.0.1"));
                    minion.insert("master_finger".to_string(), json!(finger.clone()));
                }

                info!(name = master_name.as_str(), "creating new master");
                let result = self
                    .create_one(&mut master_entry, false)
                    .await
                    .map_err(|err| EngineError::MasterCreateFailed {
                        name: master_name.clone(),
                        reason: err.to_string(),
                    })?;
                let host = extract_host(&result)
                    .ok_or_else(|| EngineError::MasterHostMissing(master_name.clone()))?;
                output.insert(master_name.clone(), result);
                master_host = Some(host);
            }
            master_finger = Some(finger);
        } else {
            master_finger = self.key_store.master_fingerprint();
        }

        // Point every remaining minion at the master for this run.
        for entry in plan.create.values_mut() {
            if let Some(host) = &master_host {
                entry.minion_mut().insert("master".to_string(), json!(host));
            }
            if let Some(finger) = &master_finger {
                entry.set("master_finger", json!(finger));
            }
        }

        let local_master = master_host.is_none();
        let escalate_single = masters.is_empty() && plan.create.len() == 1;

        if self.options.parallel {
            self.create_parallel(&plan, local_master, &mut output).await?;
        } else {
            let ordered: Vec<DesiredEntry> =
                plan.create_by_level().into_iter().cloned().collect();
            for mut entry in ordered {
                if self.interrupt.is_raised() {
                    warn!("caught interrupt, aborting map run");
                    return Err(PoolError::BatchInterrupted.into());
                }
                let name = entry.name.clone();
                match self.create_one(&mut entry, local_master).await {
                    Ok(result) => {
                        output.insert(name, result);
                    }
                    Err(err) => {
                        error!(name = name.as_str(), error = %err, "failed to create instance");
                        if escalate_single {
                            return Err(EngineError::CreateFailed {
                                name,
                                reason: err.to_string(),
                            });
                        }
                        output.insert(name, json!({"Error": err.to_string()}));
                    }
                }
            }
        }

        self.destroy_unclaimed(&plan, &mut output).await?;
        self.run_start_action(&create_levels, &mut output).await?;

        for name in plan.existing.keys() {
            output
                .entry(name.clone())
                .or_insert_with(|| json!({"Message": "Already running"}));
        }

        Ok(output)
    }

    /// Destroy named live instances wherever they run
    pub async fn destroy(&mut self, names: &[String]) -> Result<BTreeMap<String, Value>> {
        let interrupt = self.interrupt.clone();
        let matches = self
            .cloud
            .get_running_by_names(names, QueryKind::ListNodes, self.options.cached, &interrupt)
            .await?;

        let mut output = BTreeMap::new();
        let targets: Vec<(String, String, String)> = matches
            .providers
            .iter()
            .flat_map(|(alias, drivers)| {
                drivers.iter().flat_map(move |(driver, nodes)| {
                    nodes
                        .keys()
                        .map(move |name| (alias.clone(), driver.clone(), name.clone()))
                })
            })
            .collect();
        if self.options.parallel {
            self.destroy_parallel(&targets, &mut output).await?;
        } else {
            for (alias, driver_name, name) in &targets {
                self.destroy_one(alias, driver_name, name, &mut output)
                    .await?;
            }
        }

        for name in names {
            output.entry(name.clone()).or_insert_with(|| {
                json!({"Error": "No machine was found to be running under this name"})
            });
        }
        Ok(output)
    }

    /// Parallel teardown through the pool, one worker per target by
    /// default. Key cleanup stays in the supervisor; workers only talk
    /// to the driver.
    async fn destroy_parallel(
        &self,
        targets: &[(String, String, String)],
        output: &mut BTreeMap<String, Value>,
    ) -> Result<()> {
        let mut items = Vec::new();
        for (alias, driver_name, name) in targets {
            let Some(driver) = self.cloud.registry().driver(driver_name) else {
                error!(driver = driver_name.as_str(), "cloud driver is not available");
                output.insert(
                    name.clone(),
                    json!({"Error": format!("Cloud driver not loaded: {driver_name}")}),
                );
                continue;
            };
            if !driver.supports(DriverOp::Destroy) {
                debug!(
                    driver = driver_name.as_str(),
                    name = name.as_str(),
                    "driver does not support destroy, skipping"
                );
                continue;
            }
            let call = DriverCall::new(alias, driver_name);
            let target = name.clone();
            items.push(WorkItem::new(name.clone(), async move {
                match driver.destroy(&call, &target).await {
                    Ok(result) => Ok(result),
                    Err(err) => {
                        error!(name = target.as_str(), error = %err, "failed to destroy instance");
                        Ok(json!({"Error": err.to_string()}))
                    }
                }
            }));
        }

        let pool = WorkerPool::new(self.options.pool_size.unwrap_or(items.len()));
        let results = pool.run_batch(items, &self.interrupt).await?;
        for (name, result) in results {
            if result.get("Error").is_some() {
                output.insert(name, result);
                continue;
            }
            let cleanup = self
                .key_store
                .remove_for_instance(&name, self.ambiguity.as_ref())?;
            output.insert(
                name,
                json!({"destroyed": result, "minion_key": cleanup_value(&cleanup)}),
            );
        }
        Ok(())
    }

    async fn create_parallel(
        &self,
        plan: &ExecutionPlan,
        local_master: bool,
        output: &mut BTreeMap<String, Value>,
    ) -> Result<()> {
        let mut by_level: BTreeMap<u32, Vec<DesiredEntry>> = BTreeMap::new();
        for entry in plan.create.values() {
            by_level.entry(entry.level).or_default().push(entry.clone());
        }

        for (level, entries) in by_level {
            debug!(level, count = entries.len(), "provisioning level batch");
            let mut items = Vec::new();
            for mut entry in entries {
                self.prepare_minion(&mut entry, local_master)?;
                let driver = self.driver_for(&entry)?;
                let call = DriverCall::new(&entry.provider.alias, &entry.provider.driver);
                items.push(WorkItem::new(entry.name.clone(), async move {
                    // Driver-level refusal is an ordinary per-entry
                    // result; only worker crashes fail the batch.
                    match driver.create(&call, &entry).await {
                        Ok(result) => Ok(result),
                        Err(err) => {
                            error!(
                                name = entry.name.as_str(),
                                error = %err,
                                "failed to create instance"
                            );
                            Ok(json!({"Error": err.to_string()}))
                        }
                    }
                }));
            }
            let pool = match self.options.pool_size {
                Some(size) => WorkerPool::new(size),
                None => WorkerPool::new(items.len()),
            };
            let results = pool.run_batch(items, &self.interrupt).await?;
            output.extend(results);
        }
        Ok(())
    }

    async fn destroy_unclaimed(
        &self,
        plan: &ExecutionPlan,
        output: &mut BTreeMap<String, Value>,
    ) -> Result<()> {
        for (alias, driver_name, name) in plan.destroy.iter().cloned().collect::<Vec<_>>() {
            warn!(
                name = name.as_str(),
                alias = alias.as_str(),
                "destroying instance not present in the map"
            );
            self.destroy_one(&alias, &driver_name, &name, output).await?;
        }
        Ok(())
    }

    async fn destroy_one(
        &self,
        alias: &str,
        driver_name: &str,
        name: &str,
        output: &mut BTreeMap<String, Value>,
    ) -> Result<()> {
        let Some(driver) = self.cloud.registry().driver(driver_name) else {
            error!(driver = driver_name, "cloud driver is not available");
            output.insert(
                name.to_string(),
                json!({"Error": format!("Cloud driver not loaded: {driver_name}")}),
            );
            return Ok(());
        };
        if !driver.supports(DriverOp::Destroy) {
            debug!(
                driver = driver_name,
                name, "driver does not support destroy, skipping"
            );
            return Ok(());
        }
        let call = DriverCall::new(alias, driver_name);
        match driver.destroy(&call, name).await {
            Ok(result) => {
                let cleanup = self
                    .key_store
                    .remove_for_instance(name, self.ambiguity.as_ref())?;
                output.insert(
                    name.to_string(),
                    json!({"destroyed": result, "minion_key": cleanup_value(&cleanup)}),
                );
            }
            Err(err) => {
                error!(name, error = %err, "failed to destroy instance");
                output.insert(name.to_string(), json!({"Error": err.to_string()}));
            }
        }
        Ok(())
    }

    /// Parallel runs only: dispatch the configured action to the newly
    /// created minions, batched by dependency level
    async fn run_start_action(
        &self,
        create_levels: &[(String, u32)],
        output: &mut BTreeMap<String, Value>,
    ) -> Result<()> {
        if !self.options.parallel {
            return Ok(());
        }
        let (Some(action), Some(runner)) = (&self.options.start_action, &self.action_runner)
        else {
            return Ok(());
        };

        let mut by_level: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for (name, level) in create_levels {
            let created = output
                .get(name)
                .and_then(Value::as_object)
                .is_some_and(|o| !o.contains_key("Error"));
            if created {
                by_level.entry(*level).or_default().push(name.clone());
            }
        }

        let mut action_out: BTreeMap<String, Value> = BTreeMap::new();
        for (level, group) in by_level {
            info!(
                level,
                targets = group.join(","),
                action = action.as_str(),
                "running start action"
            );
            let results = runner.run(&group, action, self.options.timeout()).await?;
            action_out.extend(results);
        }
        for (name, ret) in action_out {
            if let Some(Value::Object(entry_out)) = output.get_mut(&name) {
                entry_out.insert("ret".to_string(), ret);
            }
        }
        Ok(())
    }

    async fn create_one(&self, entry: &mut DesiredEntry, local_master: bool) -> Result<Value> {
        self.prepare_minion(entry, local_master)?;
        let driver = self.driver_for(entry)?;
        let call = DriverCall::new(&entry.provider.alias, &entry.provider.driver);
        info!(name = entry.name.as_str(), provider = %call, "creating instance");
        Ok(driver.create(&call, entry).await?)
    }

    /// Generate the minion keypair when missing. With no new master in
    /// the run the local master accepts the key directly.
    fn prepare_minion(&self, entry: &mut DesiredEntry, local_master: bool) -> Result<()> {
        if !entry.make_minion() || entry.config.contains_key("pub_key") {
            return Ok(());
        }
        let keys = KeyPair::generate(self.options.keysize);
        if local_master {
            self.key_store.accept(&minion_id(entry), &keys.public)?;
        }
        entry.set("pub_key", json!(keys.public));
        entry.set("priv_key", json!(keys.private));
        Ok(())
    }

    fn driver_for(&self, entry: &DesiredEntry) -> Result<Arc<dyn CloudDriver>> {
        let driver = self
            .cloud
            .registry()
            .driver(&entry.provider.driver)
            .ok_or_else(|| CloudError::DriverNotLoaded(entry.provider.driver.clone()))?;
        if !driver.supports(DriverOp::Create) {
            return Err(CloudError::UnsupportedOperation {
                driver: entry.provider.driver.clone(),
                operation: "create".to_string(),
            }
            .into());
        }
        Ok(driver)
    }
}

/// The id the minion will present to the master: explicit `minion.id`
/// over the instance name, with `append_domain` honored
fn minion_id(entry: &DesiredEntry) -> String {
    let base = entry
        .config
        .get("minion")
        .and_then(|m| m.get("id"))
        .and_then(Value::as_str)
        .unwrap_or(&entry.name);
    match entry.config.get("append_domain").and_then(Value::as_str) {
        Some(domain) => format!("{base}.{domain}"),
        None => base.to_string(),
    }
}

/// Reachable host of a freshly created instance, from the driver's
/// create payload
fn extract_host(result: &Value) -> Option<String> {
    result
        .get("deploy_kwargs")
        .and_then(|d| d.get("host"))
        .or_else(|| result.get("host"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn cleanup_value(cleanup: &KeyCleanup) -> Value {
    match cleanup {
        KeyCleanup::NotFound => json!("no key found"),
        KeyCleanup::Removed(keys) => json!({"removed": keys}),
        KeyCleanup::Ambiguous(keys) => json!({"ambiguous": keys}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use skymap_cloud::{ProviderRegistry, StubDriver};
    use skymap_core::{NodeMap, Profile, ProviderTarget};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Driver that captures every entry it is asked to create, so tests
    /// can assert on the injected configuration.
    struct RecordingDriver {
        name: String,
        entries: Mutex<Vec<DesiredEntry>>,
        omit_host: bool,
    }

    impl RecordingDriver {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                entries: Mutex::new(Vec::new()),
                omit_host: false,
            }
        }

        fn without_host(mut self) -> Self {
            self.omit_host = true;
            self
        }

        fn entries(&self) -> Vec<DesiredEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CloudDriver for RecordingDriver {
        fn name(&self) -> &str {
            &self.name
        }

        async fn query(&self, _call: &DriverCall, _kind: QueryKind) -> skymap_cloud::Result<NodeMap> {
            Ok(NodeMap::new())
        }

        async fn create(
            &self,
            _call: &DriverCall,
            entry: &DesiredEntry,
        ) -> skymap_cloud::Result<Value> {
            self.entries.lock().unwrap().push(entry.clone());
            if self.omit_host {
                return Ok(json!({"name": entry.name}));
            }
            Ok(json!({
                "name": entry.name,
                "deploy_kwargs": {"host": format!("192.0.2.{}", entry.name.len())},
            }))
        }

        async fn destroy(&self, _call: &DriverCall, name: &str) -> skymap_cloud::Result<Value> {
            Ok(json!({"destroyed": true, "name": name}))
        }
    }

    struct StubActionRunner;

    #[async_trait]
    impl ActionRunner for StubActionRunner {
        async fn run(
            &self,
            targets: &[String],
            action: &str,
            _timeout: Duration,
        ) -> Result<BTreeMap<String, Value>> {
            Ok(targets
                .iter()
                .map(|t| (t.clone(), json!({"action": action, "result": true})))
                .collect())
        }
    }

    fn cloud_with(driver: Arc<dyn CloudDriver>, alias: &str) -> Cloud {
        let driver_name = driver.name().to_string();
        let mut reg = ProviderRegistry::new();
        reg.register_driver(driver);
        reg.add_provider(alias, driver_name, json!({}));
        Cloud::new(reg)
    }

    fn options_with_pki(dir: &tempfile::TempDir) -> RunOptions {
        let mut options = RunOptions::default();
        options.pki_dir = dir.path().to_path_buf();
        options
    }

    fn entry(name: &str, requires: &[&str]) -> DesiredEntry {
        let mut e = DesiredEntry::new(name, ProviderTarget::new("prod", "ec2"));
        e.requires = requires.iter().map(|s| s.to_string()).collect();
        e
    }

    fn plan_of(entries: Vec<DesiredEntry>) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        for e in entries {
            plan.create.insert(e.name.clone(), e);
        }
        plan
    }

    fn runner(cloud: Cloud, options: RunOptions) -> MapRunner {
        MapRunner::new(cloud, options, ProfileRegistry::new(), RenderedMap::new())
    }

    #[tokio::test]
    async fn dependencies_are_created_first() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2"));
        let mut runner = runner(cloud_with(stub.clone(), "prod"), options_with_pki(&pki));
        let plan = plan_of(vec![
            entry("web1", &["db1", "db2"]),
            entry("db1", &[]),
            entry("db2", &[]),
        ]);
        let output = runner.run_map(plan).await.unwrap();
        assert_eq!(output.len(), 3);
        let created = stub.created();
        let web_pos = created.iter().position(|n| n == "web1").unwrap();
        assert!(created.iter().position(|n| n == "db1").unwrap() < web_pos);
        assert!(created.iter().position(|n| n == "db2").unwrap() < web_pos);
    }

    #[tokio::test]
    async fn parallel_batches_respect_levels() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2"));
        let mut options = options_with_pki(&pki);
        options.parallel = true;
        let mut runner = runner(cloud_with(stub.clone(), "prod"), options);
        let plan = plan_of(vec![
            entry("web1", &["db1", "db2"]),
            entry("db1", &[]),
            entry("db2", &[]),
        ]);
        let output = runner.run_map(plan).await.unwrap();
        assert_eq!(output.len(), 3);
        let created = stub.created();
        let web_pos = created.iter().position(|n| n == "web1").unwrap();
        assert!(created.iter().position(|n| n == "db1").unwrap() < web_pos);
        assert!(created.iter().position(|n| n == "db2").unwrap() < web_pos);
    }

    #[tokio::test]
    async fn dependency_loop_aborts_before_creating_anything() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2"));
        let mut runner = runner(cloud_with(stub.clone(), "prod"), options_with_pki(&pki));
        let plan = plan_of(vec![entry("a", &["b"]), entry("b", &["a"])]);
        let err = runner.run_map(plan).await.unwrap_err();
        assert!(matches!(err, EngineError::DependencyLoop));
        assert!(stub.created().is_empty());
    }

    #[tokio::test]
    async fn existing_entries_report_already_running() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2"));
        let mut runner = runner(cloud_with(stub.clone(), "prod"), options_with_pki(&pki));
        let mut plan = plan_of(vec![entry("web1", &[])]);
        plan.existing.insert("old1".to_string(), entry("old1", &[]));
        let output = runner.run_map(plan).await.unwrap();
        assert_eq!(output["old1"], json!({"Message": "Already running"}));
        assert_eq!(stub.created(), vec!["web1"]);
    }

    #[tokio::test]
    async fn master_bootstraps_first_and_minions_point_at_it() {
        let pki = tempfile::tempdir().unwrap();
        let recording = Arc::new(RecordingDriver::new("ec2"));
        let mut runner = runner(cloud_with(recording.clone(), "prod"), options_with_pki(&pki));
        let mut master = entry("master1", &[]);
        master.set("make_master", json!(true));
        let plan = plan_of(vec![master, entry("web1", &[])]);
        let output = runner.run_map(plan).await.unwrap();
        assert_eq!(output.len(), 2);

        let entries = recording.entries();
        assert_eq!(entries[0].name, "master1");
        assert!(entries[0].config.contains_key("master_pub"));
        assert!(entries[0].config.contains_key("master_pem"));
        let preseed = entries[0].config["preseed_minion_keys"].as_object().unwrap();
        assert!(preseed.contains_key("master1"));
        assert!(preseed.contains_key("web1"));
        // Master runs its own minion against localhost.
        assert_eq!(entries[0].config["minion"]["master"], "127.0.0.1");

        let minion = &entries[1];
        assert_eq!(minion.name, "web1");
        assert_eq!(
            minion.config["minion"]["master"],
            json!(format!("192.0.2.{}", "master1".len()))
        );
        assert!(minion.config.contains_key("master_finger"));
        assert!(minion.config.contains_key("pub_key"));
    }

    #[tokio::test]
    async fn two_masters_are_rejected() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2"));
        let mut runner = runner(cloud_with(stub, "prod"), options_with_pki(&pki));
        let mut m1 = entry("m1", &[]);
        m1.set("make_master", json!(true));
        let mut m2 = entry("m2", &[]);
        m2.set("make_master", json!(true));
        let err = runner.run_map(plan_of(vec![m1, m2])).await.unwrap_err();
        assert!(matches!(err, EngineError::MultipleMasters(names) if names.len() == 2));
    }

    #[tokio::test]
    async fn master_without_a_host_aborts_the_run() {
        let pki = tempfile::tempdir().unwrap();
        let recording = Arc::new(RecordingDriver::new("ec2").without_host());
        let mut runner = runner(cloud_with(recording, "prod"), options_with_pki(&pki));
        let mut master = entry("master1", &[]);
        master.set("make_master", json!(true));
        let err = runner
            .run_map(plan_of(vec![master, entry("web1", &[])]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MasterHostMissing(name) if name == "master1"));
    }

    #[tokio::test]
    async fn master_create_failure_aborts_the_run() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2").failing_create("master1"));
        let mut runner = runner(cloud_with(stub.clone(), "prod"), options_with_pki(&pki));
        let mut master = entry("master1", &[]);
        master.set("make_master", json!(true));
        let err = runner
            .run_map(plan_of(vec![master, entry("web1", &[])]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MasterCreateFailed { name, .. } if name == "master1"));
        // Nothing after the master may have been attempted.
        assert!(stub.created().is_empty());
    }

    #[tokio::test]
    async fn per_entry_failure_is_recorded_not_fatal() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2").failing_create("web1"));
        let mut runner = runner(cloud_with(stub.clone(), "prod"), options_with_pki(&pki));
        let output = runner
            .run_map(plan_of(vec![entry("web1", &[]), entry("web2", &[])]))
            .await
            .unwrap();
        assert!(output["web1"]["Error"].is_string());
        assert_eq!(output["web2"]["name"], "web2");
        assert_eq!(stub.created(), vec!["web2"]);
    }

    #[tokio::test]
    async fn sole_entry_failure_escalates() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2").failing_create("web1"));
        let mut runner = runner(cloud_with(stub, "prod"), options_with_pki(&pki));
        let err = runner
            .run_map(plan_of(vec![entry("web1", &[])]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CreateFailed { name, .. } if name == "web1"));
    }

    #[tokio::test]
    async fn local_master_preseeds_minion_keys() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2"));
        let mut runner = runner(cloud_with(stub, "prod"), options_with_pki(&pki));
        let mut web = entry("web1", &[]);
        web.set("append_domain", json!("example.com"));
        runner.run_map(plan_of(vec![web])).await.unwrap();
        assert!(pki.path().join("minions/web1.example.com").is_file());
    }

    #[tokio::test]
    async fn hard_map_destroy_targets_are_torn_down() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2").with_node("prod", "stray1", "running"));
        let mut runner = runner(cloud_with(stub.clone(), "prod"), options_with_pki(&pki));
        let mut plan = ExecutionPlan::new();
        plan.destroy.insert((
            "prod".to_string(),
            "ec2".to_string(),
            "stray1".to_string(),
        ));
        let output = runner.run_map(plan).await.unwrap();
        assert_eq!(stub.destroyed(), vec!["stray1"]);
        assert_eq!(output["stray1"]["destroyed"]["name"], "stray1");
        assert_eq!(output["stray1"]["minion_key"], "no key found");
    }

    #[tokio::test]
    async fn start_action_results_merge_under_ret() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2").failing_create("bad1"));
        let mut options = options_with_pki(&pki);
        options.parallel = true;
        options.start_action = Some("state.highstate".to_string());
        let mut runner = runner(cloud_with(stub, "prod"), options)
            .with_action_runner(Arc::new(StubActionRunner));
        let output = runner
            .run_map(plan_of(vec![entry("web1", &[]), entry("bad1", &[])]))
            .await
            .unwrap();
        assert_eq!(output["web1"]["ret"]["action"], "state.highstate");
        // Failed entries must not be targeted by the start action.
        assert!(output["bad1"].get("ret").is_none());
    }

    #[tokio::test]
    async fn map_data_plans_against_live_inventory() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2").with_node("prod", "web1", "running"));
        let mut profiles = ProfileRegistry::new();
        profiles.insert(
            "web".to_string(),
            Profile {
                name: "web".to_string(),
                provider: ProviderTarget::new("prod", "ec2"),
                defaults: serde_json::Map::new(),
            },
        );
        let mut rendered = RenderedMap::new();
        rendered.insert(
            "web".to_string(),
            BTreeMap::from([
                ("web1".to_string(), serde_json::Map::new()),
                ("web2".to_string(), serde_json::Map::new()),
            ]),
        );
        let mut runner = MapRunner::new(
            cloud_with(stub, "prod"),
            options_with_pki(&pki),
            profiles,
            rendered,
        );
        let plan = runner.map_data().await.unwrap();
        assert!(plan.existing.contains_key("web1"));
        assert_eq!(plan.create.keys().collect::<Vec<_>>(), vec!["web2"]);
    }

    #[tokio::test]
    async fn destroy_by_name_reports_misses() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new("ec2").with_node("prod", "web1", "running"));
        let mut runner = runner(cloud_with(stub.clone(), "prod"), options_with_pki(&pki));
        let output = runner
            .destroy(&["web1".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(stub.destroyed(), vec!["web1"]);
        assert_eq!(output["web1"]["destroyed"]["name"], "web1");
        assert!(output["ghost"]["Error"].is_string());
    }

    #[tokio::test]
    async fn parallel_destroy_batches_every_target() {
        let pki = tempfile::tempdir().unwrap();
        let stub = Arc::new(
            StubDriver::new("ec2")
                .with_node("prod", "web1", "running")
                .with_node("prod", "web2", "running")
                .with_node("prod", "web3", "running"),
        );
        let mut options = options_with_pki(&pki);
        options.parallel = true;
        let mut runner = runner(cloud_with(stub.clone(), "prod"), options);
        let output = runner
            .destroy(&["web1".to_string(), "web2".to_string(), "web3".to_string()])
            .await
            .unwrap();
        let mut destroyed = stub.destroyed();
        destroyed.sort();
        assert_eq!(destroyed, vec!["web1", "web2", "web3"]);
        for name in ["web1", "web2", "web3"] {
            assert_eq!(output[name]["destroyed"]["name"], name);
            assert_eq!(output[name]["minion_key"], "no key found");
        }
    }
}
