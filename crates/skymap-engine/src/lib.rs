//! Map orchestration engine for skymap
//!
//! Everything between a rendered map file and a finished run lives here:
//!
//! - [`reconcile::map_data`]: classify every named instance against live
//!   inventory (create, existing, or destroy on hard maps)
//! - [`deps`]: dependency loop detection and level assignment
//! - [`keys`]: minion key preseeding and destroy-time key cleanup
//! - [`MapRunner`]: the full run, master bootstrap included

pub mod action;
pub mod deps;
pub mod error;
pub mod keys;
pub mod reconcile;
pub mod runner;

pub use action::ActionRunner;
pub use error::{EngineError, Result};
pub use keys::{AmbiguityResolver, KeyCleanup, KeyPair, KeyStore};
pub use runner::MapRunner;
