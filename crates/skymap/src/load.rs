//! Configuration file loading
//!
//! Three YAML surfaces feed one run:
//!
//! - providers: alias -> provider block (with a `driver` key), or a list
//!   of blocks when one alias fronts several drivers
//! - profiles: profile name -> provider binding plus defaults
//! - map: profile name -> instance names, as a bare list, a list of
//!   name -> override blocks, or a plain name -> overrides mapping

use anyhow::{bail, Context, Result};
use skymap_core::{Profile, ProfileRegistry, ProviderTarget, RenderedMap};
use std::collections::BTreeMap;
use std::path::Path;

/// alias -> driver -> provider config
pub type ProviderConfigs = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

pub fn load_providers(path: &Path) -> Result<ProviderConfigs> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading providers file {}", path.display()))?;
    let parsed: BTreeMap<String, serde_yaml::Value> =
        serde_yaml::from_str(&raw).context("parsing providers file")?;

    let mut providers = ProviderConfigs::new();
    for (alias, value) in parsed {
        let blocks: Vec<serde_yaml::Value> = match value {
            serde_yaml::Value::Sequence(seq) => seq,
            other => vec![other],
        };
        for block in blocks {
            let mut config: serde_json::Value =
                serde_json::to_value(&block).context("converting provider block")?;
            let Some(driver) = config
                .as_object_mut()
                .and_then(|o| o.remove("driver"))
                .and_then(|d| d.as_str().map(str::to_string))
            else {
                bail!("provider {alias:?} has no 'driver' key");
            };
            providers
                .entry(alias.clone())
                .or_default()
                .insert(driver, config);
        }
    }
    Ok(providers)
}

pub fn load_profiles(path: &Path) -> Result<ProfileRegistry> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading profiles file {}", path.display()))?;
    let parsed: BTreeMap<String, serde_yaml::Value> =
        serde_yaml::from_str(&raw).context("parsing profiles file")?;

    let mut profiles = ProfileRegistry::new();
    for (name, value) in parsed {
        let mut defaults: serde_json::Value =
            serde_json::to_value(&value).context("converting profile block")?;
        let Some(provider) = defaults
            .as_object_mut()
            .and_then(|o| o.remove("provider"))
            .and_then(|p| p.as_str().map(str::to_string))
        else {
            bail!("profile {name:?} has no 'provider' key");
        };
        let provider = ProviderTarget::parse(&provider)
            .with_context(|| format!("profile {name:?} provider"))?;
        profiles.insert(
            name.clone(),
            Profile {
                name,
                provider,
                defaults: defaults.as_object().cloned().unwrap_or_default(),
            },
        );
    }
    Ok(profiles)
}

pub fn load_map(path: &Path) -> Result<RenderedMap> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading map file {}", path.display()))?;
    let parsed: BTreeMap<String, serde_yaml::Value> =
        serde_yaml::from_str(&raw).context("parsing map file")?;

    let mut rendered = RenderedMap::new();
    for (profile, value) in parsed {
        let mut instances: BTreeMap<String, serde_json::Map<String, serde_json::Value>> =
            BTreeMap::new();
        match value {
            // - web1
            // - web2:
            //     size: large
            serde_yaml::Value::Sequence(seq) => {
                for item in seq {
                    match item {
                        serde_yaml::Value::String(name) => {
                            instances.insert(name, serde_json::Map::new());
                        }
                        serde_yaml::Value::Mapping(mapping) => {
                            for (key, overrides) in mapping {
                                let Some(name) = key.as_str().map(str::to_string) else {
                                    bail!("map entry under {profile:?} has a non-string name");
                                };
                                instances.insert(name, to_overrides(&overrides)?);
                            }
                        }
                        other => {
                            bail!("unexpected map entry under {profile:?}: {other:?}")
                        }
                    }
                }
            }
            // web1:
            //   size: large
            serde_yaml::Value::Mapping(mapping) => {
                for (key, overrides) in mapping {
                    let Some(name) = key.as_str().map(str::to_string) else {
                        bail!("map entry under {profile:?} has a non-string name");
                    };
                    instances.insert(name, to_overrides(&overrides)?);
                }
            }
            serde_yaml::Value::Null => {}
            other => bail!("unexpected map shape under {profile:?}: {other:?}"),
        }
        rendered.insert(profile, instances);
    }
    Ok(rendered)
}

fn to_overrides(value: &serde_yaml::Value) -> Result<serde_json::Map<String, serde_json::Value>> {
    if value.is_null() {
        return Ok(serde_json::Map::new());
    }
    let json: serde_json::Value = serde_json::to_value(value).context("converting map overrides")?;
    Ok(json.as_object().cloned().unwrap_or_default())
}
