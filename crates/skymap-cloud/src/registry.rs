//! Provider registry: configured aliases bound to loaded drivers

use crate::driver::CloudDriver;
use crate::error::{CloudError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Configured (alias, driver) pairs plus the driver implementations
/// backing them.
///
/// An alias may carry several drivers (rare); the pair is unique.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    /// alias -> driver name -> provider config
    providers: BTreeMap<String, BTreeMap<String, serde_json::Value>>,

    /// driver name -> implementation
    drivers: HashMap<String, Arc<dyn CloudDriver>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_driver(&mut self, driver: Arc<dyn CloudDriver>) {
        self.drivers.insert(driver.name().to_string(), driver);
    }

    pub fn add_provider(
        &mut self,
        alias: impl Into<String>,
        driver: impl Into<String>,
        config: serde_json::Value,
    ) {
        self.providers
            .entry(alias.into())
            .or_default()
            .insert(driver.into(), config);
    }

    pub fn driver(&self, name: &str) -> Option<Arc<dyn CloudDriver>> {
        self.drivers.get(name).cloned()
    }

    pub fn providers(&self) -> &BTreeMap<String, BTreeMap<String, serde_json::Value>> {
        &self.providers
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Every configured (alias, driver) pair
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.providers
            .iter()
            .flat_map(|(alias, drivers)| {
                drivers
                    .keys()
                    .map(move |driver| (alias.clone(), driver.clone()))
            })
            .collect()
    }

    /// Human-facing selection names: bare alias, or `alias:driver` when
    /// the alias carries more than one driver
    pub fn configured_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for (alias, drivers) in &self.providers {
            if drivers.len() > 1 {
                for driver in drivers.keys() {
                    names.push(format!("{alias}:{driver}"));
                }
            } else {
                names.push(alias.clone());
            }
        }
        names
    }

    /// Resolve a lookup pattern to (alias, driver) pairs.
    ///
    /// `"all"` selects every pair; `"alias:driver"` selects exactly one;
    /// a bare name matches as either an alias or a driver.
    pub fn lookup_providers(&self, lookup: &str) -> Result<BTreeSet<(String, String)>> {
        if lookup == "all" {
            let pairs: BTreeSet<_> = self.pairs().into_iter().collect();
            if pairs.is_empty() {
                return Err(CloudError::NoProvidersConfigured);
            }
            return Ok(pairs);
        }

        if let Some((alias, driver)) = lookup.split_once(':') {
            let known = self
                .providers
                .get(alias)
                .map(|drivers| drivers.contains_key(driver))
                .unwrap_or(false);
            if !known {
                return Err(self.no_match(lookup));
            }
            let mut pairs = BTreeSet::new();
            pairs.insert((alias.to_string(), driver.to_string()));
            return Ok(pairs);
        }

        let pairs: BTreeSet<_> = self
            .pairs()
            .into_iter()
            .filter(|(alias, driver)| lookup == alias || lookup == driver)
            .collect();
        if pairs.is_empty() {
            return Err(self.no_match(lookup));
        }
        Ok(pairs)
    }

    fn no_match(&self, lookup: &str) -> CloudError {
        CloudError::NoMatchingProviders {
            lookup: lookup.to_string(),
            available: self.configured_names().join(", "),
        }
    }

    /// Drop configured providers whose driver implementation is not
    /// loaded, so later fanout passes don't trip over them.
    pub fn filter_unloaded(&mut self) {
        let loaded = &self.drivers;
        self.providers.retain(|alias, drivers| {
            drivers.retain(|driver, _| {
                if loaded.contains_key(driver) {
                    true
                } else {
                    warn!(
                        alias = alias.as_str(),
                        driver = driver.as_str(),
                        "cloud driver is not loaded, removing provider from the available list"
                    );
                    false
                }
            });
            !drivers.is_empty()
        });
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers)
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .finish()
    }
}
