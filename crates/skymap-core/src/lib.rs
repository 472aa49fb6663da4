//! Core data model for skymap
//!
//! This crate holds the types shared by every layer of the orchestration
//! engine: provider-reported node inventory, desired-state map entries,
//! the computed execution plan, and the run options surface.
//!
//! Nothing in here talks to a cloud. Drivers and the execution machinery
//! live in `skymap-cloud`, `skymap-pool` and `skymap-engine`.

pub mod entry;
pub mod error;
pub mod merge;
pub mod node;
pub mod options;
pub mod plan;

// Re-exports
pub use entry::{DesiredEntry, Profile, ProfileRegistry, ProviderTarget, RenderedMap};
pub use error::{CoreError, Result};
pub use merge::merge_value;
pub use node::{LiveInventory, NodeMap, NodeRecord};
pub use options::RunOptions;
pub use plan::{DestroyTarget, ExecutionPlan, PlanSummary};
