//! Error types shared across the pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Weather API key not found! Please set the API_KEY_OW environment variable")]
    MissingApiKey,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures of a single request attempt inside the fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unreadable forecast payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Network(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("region {0} not found")]
    RegionNotFound(u32),

    #[error("invalid stored value: {0}")]
    InvalidData(String),

    #[error("database connection lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Reasons a run stops before every region has been visited.
#[derive(Debug, Error)]
pub enum RunAbort {
    #[error("provider rejected region {region} with code {code}: {message}")]
    Rejected {
        region: u32,
        code: String,
        message: String,
    },

    #[error("provider unreachable for region {region} after {attempts} attempts")]
    Exhausted { region: u32, attempts: u32 },

    #[error("storage failure for region {region}: {source}")]
    Storage {
        region: u32,
        #[source]
        source: StoreError,
    },
}
