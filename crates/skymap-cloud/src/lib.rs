//! Cloud driver abstraction and provider fanout for skymap
//!
//! This crate owns the seam between the orchestration engine and the
//! concrete cloud backends:
//!
//! - [`CloudDriver`]: the trait every backend implements, with typed
//!   capability probing (`supports`) instead of stringly-named function
//!   lookups, and an explicit [`DriverCall`] identity threaded into every
//!   call instead of ambient global state.
//! - [`ProviderRegistry`]: configured (alias, driver) pairs bound to
//!   loaded driver implementations.
//! - [`Cloud`]: the fanout engine that queries every configured provider
//!   for live inventory, sequentially or through the worker pool, with
//!   per-provider failure isolation and a per-query-kind snapshot cache.

pub mod driver;
pub mod error;
pub mod fanout;
pub mod optimize;
pub mod registry;
pub mod stub;

pub use driver::{CloudDriver, DriverCall, DriverOp, QueryKind};
pub use error::{CloudError, Result};
pub use fanout::Cloud;
pub use optimize::optimize_providers;
pub use registry::ProviderRegistry;
pub use stub::StubDriver;
