//! Engine error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Uh-oh, that cloud map has a dependency loop")]
    DependencyLoop,

    #[error("Missing dependency in cloud map: {name} requires {dependency}")]
    MissingDependency { name: String, dependency: String },

    #[error(
        "The --hard map can be extremely dangerous to run, and therefore must explicitly \
         be enabled in the main configuration file, by setting 'enable_hard_maps' to True"
    )]
    HardMapsDisabled,

    #[error("Only one make_master entry is allowed per map, found: {}", .0.join(", "))]
    MultipleMasters(Vec<String>),

    #[error("Host for new master {0} was not found, aborting map")]
    MasterHostMissing(String),

    #[error("An error occurred while creating the master, not continuing: {reason}")]
    MasterCreateFailed { name: String, reason: String },

    #[error("Failed to deploy {name}: {reason}")]
    CreateFailed { name: String, reason: String },

    #[error(transparent)]
    Cloud(#[from] skymap_cloud::CloudError),

    #[error(transparent)]
    Pool(#[from] skymap_pool::PoolError),

    #[error(transparent)]
    Core(#[from] skymap_core::CoreError),

    #[error("Key glob error: {0}")]
    KeyGlob(#[from] glob::PatternError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
