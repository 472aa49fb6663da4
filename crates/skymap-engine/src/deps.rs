//! Map dependency resolution
//!
//! Entries declare the instances that must exist before them through
//! `requires`. Loop detection walks every path from every create entry;
//! a name reappearing on its own path is a loop, while diamonds (two
//! paths converging on one dependency) are legal. Level assignment ranks
//! each create entry one past its deepest dependency so the runner can
//! provision in batches of equal rank.

use crate::error::{EngineError, Result};
use skymap_core::ExecutionPlan;
use std::collections::HashMap;

/// Whether any create entry participates in a dependency loop.
///
/// Only the create set is walked; a dependency resolving to an existing
/// instance (or to nothing) ends its path.
pub fn has_loop(plan: &ExecutionPlan) -> bool {
    for entry in plan.create.values() {
        for dep in &entry.requires {
            if walk(plan, &mut Vec::new(), dep) {
                return true;
            }
        }
    }
    false
}

fn walk(plan: &ExecutionPlan, seen: &mut Vec<String>, name: &str) -> bool {
    if seen.iter().any(|s| s == name) {
        return true;
    }
    seen.push(name.to_string());
    let requires = plan
        .create
        .get(name)
        .map(|entry| entry.requires.as_slice())
        .unwrap_or(&[]);
    for dep in requires {
        // Each branch gets its own copy of the path, so siblings sharing
        // a dependency don't trip each other.
        if walk(plan, &mut seen.clone(), dep) {
            return true;
        }
    }
    seen.pop();
    false
}

/// Assign a topological level to every create and existing entry.
///
/// An entry without dependencies sits at level 0; otherwise its level is
/// one past the maximum level among its dependencies. Dependencies
/// resolve against the create set first, then existing; a name matching
/// neither is fatal. Entries sharing a level have no ordering guarantee
/// between them.
pub fn assign_levels(plan: &mut ExecutionPlan) -> Result<()> {
    let mut memo: HashMap<String, u32> = HashMap::new();
    let names: Vec<String> = plan.create.keys().cloned().collect();
    for name in names {
        let level = level_of(plan, &name, &name, &mut memo)?;
        if let Some(entry) = plan.create.get_mut(&name) {
            entry.level = level;
        }
    }
    let names: Vec<String> = plan.existing.keys().cloned().collect();
    for name in names {
        let level = level_of(plan, &name, &name, &mut memo)?;
        if let Some(entry) = plan.existing.get_mut(&name) {
            entry.level = level;
        }
    }
    Ok(())
}

fn level_of(
    plan: &ExecutionPlan,
    requirer: &str,
    name: &str,
    memo: &mut HashMap<String, u32>,
) -> Result<u32> {
    if let Some(&level) = memo.get(name) {
        return Ok(level);
    }
    let entry = plan
        .lookup(name)
        .ok_or_else(|| EngineError::MissingDependency {
            name: requirer.to_string(),
            dependency: name.to_string(),
        })?;
    let level = if entry.requires.is_empty() {
        0
    } else {
        let mut deepest = 0;
        for dep in &entry.requires {
            deepest = deepest.max(level_of(plan, name, dep, memo)?);
        }
        deepest + 1
    };
    memo.insert(name.to_string(), level);
    Ok(level)
}
