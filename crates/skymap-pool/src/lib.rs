//! Bounded worker pool supervision for skymap
//!
//! Batches of provider work (inventory queries, creates, destroys) run
//! through a [`WorkerPool`]: every item executes in its own spawned task
//! that owns a copy of its inputs and reports exactly one typed
//! [`WorkerReport`] back over a channel. The supervisor fails the whole
//! batch fast on the first worker-level error or interrupt, terminating
//! every sibling worker before surfacing the failure.
//!
//! Recoverable trouble (a provider answering garbage, a network timeout)
//! belongs *inside* the job, downgraded before it ever reaches this
//! layer. Only genuinely unexpected worker crashes propagate here.

pub mod error;
pub mod interrupt;
pub mod pool;

pub use error::{JobError, PoolError, Result};
pub use interrupt::Interrupt;
pub use pool::{WorkItem, WorkerInit, WorkerPool, WorkerReport};
