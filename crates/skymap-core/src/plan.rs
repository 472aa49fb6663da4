//! Execution plan produced by reconciliation
//!
//! The plan classifies every named instance as `create`, `existing` or
//! (hard maps only) `destroy`. It is owned exclusively by the map runner
//! for the lifetime of one run.

use crate::entry::DesiredEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A live instance scheduled for destruction: (alias, driver, name)
pub type DestroyTarget = (String, String, String);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Entries to provision, keyed by instance name
    pub create: BTreeMap<String, DesiredEntry>,

    /// Entries present in the map that already run on a provider
    #[serde(default)]
    pub existing: BTreeMap<String, DesiredEntry>,

    /// Hard-map only: live instances absent from the desired map
    #[serde(default)]
    pub destroy: BTreeSet<DestroyTarget>,

    /// Profiles referenced by the map but missing from the registry,
    /// with the explanation recorded per profile name
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a dependency name against the create set, then existing
    pub fn lookup(&self, name: &str) -> Option<&DesiredEntry> {
        self.create.get(name).or_else(|| self.existing.get(name))
    }

    /// Create entries sorted ascending by computed level.
    ///
    /// Entries sharing a level carry no defined relative order; the sort
    /// is stable over the map's name ordering.
    pub fn create_by_level(&self) -> Vec<&DesiredEntry> {
        let mut entries: Vec<&DesiredEntry> = self.create.values().collect();
        entries.sort_by_key(|e| e.level);
        entries
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.create.len(),
            existing: self.existing.len(),
            destroy: self.destroy.len(),
            errors: self.errors.len(),
        }
    }
}

/// Counts for one planning pass
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub create: usize,
    pub existing: usize,
    pub destroy: usize,
    pub errors: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} already running, {} to destroy, {} profile errors",
            self.create, self.existing, self.destroy, self.errors
        )
    }
}
