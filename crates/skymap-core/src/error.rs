//! Core error types

use thiserror::Error;

/// Errors raised while building or validating the core data model
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid provider reference {0:?}: expected \"alias:driver\"")]
    InvalidProviderTarget(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Invalid run options: {0}")]
    InvalidOptions(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
