//! Pool and job error types

use thiserror::Error;

/// Failure of a single work item, as reported by its worker
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// The job hit an unexpected error; `class` names the error kind and
    /// `trace` carries the formatted failure chain
    #[error("{class}: {trace}")]
    Failed { class: String, trace: String },

    /// The job observed a cancellation signal
    #[error("job interrupted")]
    Interrupted,
}

impl JobError {
    pub fn failed(class: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Failed {
            class: class.into(),
            trace: err.to_string(),
        }
    }
}

/// Batch-level failure surfaced by the supervisor
///
/// There is no partial-success variant: a batch that saw a worker-level
/// failure returns nothing.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker {key:?} failed ({class}), terminating workers: {trace}")]
    BatchFailed {
        key: String,
        class: String,
        trace: String,
    },

    #[error("caught interrupt, terminating workers")]
    BatchInterrupted,
}

pub type Result<T> = std::result::Result<T, PoolError>;
