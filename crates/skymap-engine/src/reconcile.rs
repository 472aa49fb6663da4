//! Desired-state reconciliation
//!
//! Takes the rendered map, the profile registry and a live inventory
//! snapshot and classifies every named instance: create it, leave it
//! alone because it already runs somewhere, or (hard maps) destroy it
//! because nothing in the map claims it.

use crate::error::{EngineError, Result};
use skymap_core::{
    merge_value, DesiredEntry, ExecutionPlan, LiveInventory, ProfileRegistry, ProviderTarget,
    RenderedMap, RunOptions,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, info, warn};

/// Build the execution plan for one map run.
///
/// `providers` is the configured alias -> driver -> config mapping; the
/// matching provider config is the second layer of the merge chain
/// (after the main config defaults, before the profile and the map
/// overrides).
pub fn map_data(
    rendered: &RenderedMap,
    profiles: &ProfileRegistry,
    options: &RunOptions,
    providers: &BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    live: &LiveInventory,
) -> Result<ExecutionPlan> {
    let mut plan = ExecutionPlan::new();
    let mut defined: BTreeSet<(String, String, String)> = BTreeSet::new();

    for (profile_name, instances) in rendered {
        let Some(profile) = profiles.get(profile_name) else {
            let msg = format!(
                "The required profile, '{profile_name}', defined in the map does not exist. \
                 The defined nodes will not be created."
            );
            error!("{msg}");
            plan.errors.insert(profile_name.clone(), msg);
            continue;
        };

        for (instance_name, overrides) in instances {
            let entry = build_entry(instance_name, profile, options, providers, overrides)?;
            defined.insert((
                entry.provider.alias.clone(),
                entry.provider.driver.clone(),
                entry.name.clone(),
            ));
            plan.create.insert(instance_name.clone(), entry);
        }
    }

    // Names already alive on any provider move out of the create set.
    // Drivers fronting the same service under different names (ec2 and
    // aws) both satisfy the match; terminated instances do not.
    let names: Vec<String> = plan.create.keys().cloned().collect();
    for name in names {
        let states = live.states_by_name(&name);
        if states.is_empty() {
            continue;
        }
        let running = states
            .iter()
            .find(|(_, state)| !state.eq_ignore_ascii_case("terminated"));
        match running {
            Some((driver, state)) => {
                warn!(
                    name = name.as_str(),
                    driver = driver.as_str(),
                    state = state.as_str(),
                    "instance already exists, not creating"
                );
                if let Some(entry) = plan.create.remove(&name) {
                    plan.existing.insert(name, entry);
                }
            }
            None => {
                info!(
                    name = name.as_str(),
                    "instance exists only in a terminated state, creating anyway"
                );
            }
        }
    }

    if options.hard {
        if !options.enable_hard_maps {
            return Err(EngineError::HardMapsDisabled);
        }
        for (alias, driver, name, _record) in live.iter_nodes() {
            let triple = (alias.to_string(), driver.to_string(), name.to_string());
            if !defined.contains(&triple) {
                plan.destroy.insert(triple);
            }
        }
    }

    Ok(plan)
}

fn build_entry(
    name: &str,
    profile: &skymap_core::Profile,
    options: &RunOptions,
    providers: &BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    overrides: &serde_json::Map<String, serde_json::Value>,
) -> Result<DesiredEntry> {
    let mut merged = serde_json::Value::Object(options.defaults.clone());

    if let Some(config) = providers
        .get(&profile.provider.alias)
        .and_then(|drivers| drivers.get(&profile.provider.driver))
    {
        merge_value(&mut merged, config);
    }
    merge_value(
        &mut merged,
        &serde_json::Value::Object(profile.defaults.clone()),
    );
    merge_value(&mut merged, &serde_json::Value::Object(overrides.clone()));

    let mut config = match merged {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    // A map override may repoint the instance at another provider.
    let provider = match config.remove("provider") {
        Some(serde_json::Value::String(s)) => ProviderTarget::parse(&s)?,
        _ => profile.provider.clone(),
    };

    let requires = match config.remove("requires") {
        Some(serde_json::Value::Array(deps)) => deps
            .iter()
            .filter_map(|d| d.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(dep)) => vec![dep],
        _ => Vec::new(),
    };

    let mut entry = DesiredEntry::new(name, provider);
    entry.requires = requires;
    entry.config = config;
    Ok(entry)
}
