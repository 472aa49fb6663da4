//! Provider config optimization
//!
//! Groups configured providers by driver so drivers that can answer for
//! many aliases at once (shared API credentials, one batched client) get
//! the chance to consolidate before a fanout pass.

use crate::driver::DriverOp;
use crate::registry::ProviderRegistry;
use std::collections::BTreeMap;
use tracing::debug;

/// Return the optimized alias -> driver -> config mapping.
///
/// Drivers supporting [`DriverOp::OptimizeProviders`] see all of their
/// alias configs at once and their returned mapping is used verbatim.
/// Drivers without the capability pass through unchanged; no alias
/// present in the input is ever dropped on that path.
pub fn optimize_providers(
    registry: &ProviderRegistry,
) -> BTreeMap<String, BTreeMap<String, serde_json::Value>> {
    // Regroup alias -> driver -> config into driver -> alias -> config.
    let mut by_driver: BTreeMap<String, BTreeMap<String, serde_json::Value>> = BTreeMap::new();
    for (alias, drivers) in registry.providers() {
        for (driver, config) in drivers {
            by_driver
                .entry(driver.clone())
                .or_default()
                .insert(alias.clone(), config.clone());
        }
    }

    let mut optimized: BTreeMap<String, BTreeMap<String, serde_json::Value>> = BTreeMap::new();
    for (driver_name, configs) in by_driver {
        let supported = registry
            .driver(&driver_name)
            .filter(|d| d.supports(DriverOp::OptimizeProviders));

        let configs = match supported.and_then(|d| d.optimize_providers(configs.clone())) {
            Some(consolidated) => consolidated,
            None => {
                debug!(driver = driver_name.as_str(), "driver is unable to be optimized");
                configs
            }
        };

        for (alias, config) in configs {
            optimized.entry(alias).or_default().insert(driver_name.clone(), config);
        }
    }

    optimized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubDriver;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn passthrough_preserves_every_alias() {
        let mut reg = ProviderRegistry::new();
        reg.register_driver(Arc::new(StubDriver::new("proxmox")));
        reg.add_provider("lab-a", "proxmox", json!({"host": "a"}));
        reg.add_provider("lab-b", "proxmox", json!({"host": "b"}));
        let optimized = optimize_providers(&reg);
        assert_eq!(optimized.len(), 2);
        assert_eq!(optimized["lab-a"]["proxmox"], json!({"host": "a"}));
        assert_eq!(optimized["lab-b"]["proxmox"], json!({"host": "b"}));
    }

    #[test]
    fn optimizing_driver_output_is_used_verbatim() {
        let mut reg = ProviderRegistry::new();
        reg.register_driver(Arc::new(StubDriver::new("ec2").with_optimizer(|configs| {
            // Consolidate every alias into the lexically-first one.
            let merged = json!({"batched": configs.len()});
            let first = configs.keys().next().cloned().unwrap_or_default();
            Some(BTreeMap::from([(first, merged)]))
        })));
        reg.add_provider("us-east", "ec2", json!({"id": "AKIA"}));
        reg.add_provider("us-west", "ec2", json!({"id": "AKIA"}));
        let optimized = optimize_providers(&reg);
        assert_eq!(optimized.len(), 1);
        assert_eq!(optimized["us-east"]["ec2"], json!({"batched": 2}));
    }

    #[test]
    fn unoptimized_drivers_ride_along_with_optimized_ones() {
        let mut reg = ProviderRegistry::new();
        reg.register_driver(Arc::new(StubDriver::new("proxmox")));
        reg.register_driver(Arc::new(
            StubDriver::new("ec2").with_optimizer(|configs| Some(configs)),
        ));
        reg.add_provider("prod", "ec2", json!({}));
        reg.add_provider("prod", "proxmox", json!({}));
        let optimized = optimize_providers(&reg);
        assert_eq!(optimized["prod"].len(), 2);
    }
}
