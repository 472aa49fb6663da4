//! Cloud layer error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("There are no cloud providers configured")]
    NoProvidersConfigured,

    #[error("No cloud providers matched {lookup:?}. Available selections: {available}")]
    NoMatchingProviders { lookup: String, available: String },

    #[error("Cloud driver not loaded: {0}")]
    DriverNotLoaded(String),

    #[error("The {driver:?} driver does not support {operation}")]
    UnsupportedOperation { driver: String, operation: String },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Core(#[from] skymap_core::CoreError),

    #[error(transparent)]
    Pool(#[from] skymap_pool::PoolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
