//! Error taxonomy shared by the library.
//!
//! Unknown keys are not errors: lookups for a missing route return empty
//! collections instead.

use reqwest::StatusCode;

/// Upstream feed or routing provider could not be reached or answered badly.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("invalid url '{0}'")]
    InvalidUrl(String),
}

/// A record that violates the data model. Rejected at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntegrityError {
    #[error("stop {stop_id} at ({lat}, {lng}) lies outside the configured bounds")]
    OutOfBounds { stop_id: String, lat: f64, lng: f64 },

    #[error("malformed {entity} record: {reason}")]
    Malformed { entity: &'static str, reason: String },

    #[error("unknown bound indicator '{0}'")]
    UnknownBound(String),
}

impl IntegrityError {
    pub(crate) fn malformed(entity: &'static str, reason: impl Into<String>) -> Self {
        IntegrityError::Malformed {
            entity,
            reason: reason.into(),
        }
    }
}

/// Invalid configuration. Fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bounding box: {0}")]
    BoundingBox(String),

    #[error("invalid url for {field}: '{value}'")]
    Url { field: &'static str, value: String },

    #[error("{field} must be {requirement}")]
    Threshold {
        field: &'static str,
        requirement: &'static str,
    },

    #[error("could not read config: {0}")]
    Load(String),
}

/// Storage failure. Surfaced to the caller; a failed batch leaves no trace.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored {column} value '{value}' is not recognised")]
    Corrupt { column: &'static str, value: String },
}

/// Umbrella error for callers that mix components.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
