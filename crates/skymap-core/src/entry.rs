//! Desired-state map entries
//!
//! A rendered map names instances per profile; merging the profile
//! defaults with the per-instance overrides yields one [`DesiredEntry`]
//! per instance. Entries are transient planning data, discarded once the
//! run completes.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One configured provider credential set bound to one driver
///
/// The pair is unique within a registry; a single alias may carry more
/// than one driver.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderTarget {
    pub alias: String,
    pub driver: String,
}

impl ProviderTarget {
    pub fn new(alias: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            driver: driver.into(),
        }
    }

    /// Parse the `"alias:driver"` form used in profiles and map files
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((alias, driver)) if !alias.is_empty() && !driver.is_empty() => {
                Ok(Self::new(alias, driver))
            }
            _ => Err(CoreError::InvalidProviderTarget(s.to_string())),
        }
    }
}

impl fmt::Display for ProviderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.alias, self.driver)
    }
}

impl TryFrom<String> for ProviderTarget {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ProviderTarget> for String {
    fn from(t: ProviderTarget) -> Self {
        format!("{}:{}", t.alias, t.driver)
    }
}

/// One node the user wants to exist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredEntry {
    /// Unique within a map
    pub name: String,

    pub provider: ProviderTarget,

    /// Names of entries that must be provisioned before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    /// Topological rank, computed by the dependency resolver
    #[serde(default)]
    pub level: u32,

    /// Merged profile + override configuration fields
    #[serde(default, flatten)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl DesiredEntry {
    pub fn new(name: impl Into<String>, provider: ProviderTarget) -> Self {
        Self {
            name: name.into(),
            provider,
            requires: Vec::new(),
            level: 0,
            config: serde_json::Map::new(),
        }
    }

    /// Truthiness of a boolean config flag, absent meaning `default`
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.config
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(default)
    }

    /// Whether this entry bootstraps the salt master for the run
    pub fn make_master(&self) -> bool {
        self.flag("make_master", false)
    }

    /// Whether this entry should also run as a minion (default true)
    pub fn make_minion(&self) -> bool {
        self.flag("make_minion", true)
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.config.insert(key.into(), value);
    }

    /// Nested `minion` config section, created on demand
    pub fn minion_mut(&mut self) -> &mut serde_json::Map<String, serde_json::Value> {
        let slot = self
            .config
            .entry("minion")
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if !slot.is_object() {
            *slot = serde_json::Value::Object(serde_json::Map::new());
        }
        match slot {
            serde_json::Value::Object(map) => map,
            _ => unreachable!("minion slot was just made an object"),
        }
    }
}

/// A named profile: provider binding plus default configuration fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub provider: ProviderTarget,

    #[serde(default, flatten)]
    pub defaults: serde_json::Map<String, serde_json::Value>,
}

/// All profiles known to one run, keyed by name
pub type ProfileRegistry = BTreeMap<String, Profile>;

/// Rendered map file: profile -> instance name -> override fields
///
/// Rendering (YAML parsing, include handling, list/dict normalization) is
/// the configuration layer's concern; the engine only consumes this shape.
pub type RenderedMap = BTreeMap<String, BTreeMap<String, serde_json::Map<String, serde_json::Value>>>;
