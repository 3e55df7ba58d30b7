use chrono::NaiveDate;
use hsync_adapters::{DestinationError, SourceError};
use hsync_core::MetricFamily;
use thiserror::Error;

/// Mandatory setting absent or unusable. Raised before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(String),
    #[error("invalid value for {name}: {message}")]
    Invalid { name: String, message: String },
}

/// Container-level failure; the container is skipped for the rest of the run.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema of container {container_id} is unavailable: {source}")]
    SchemaUnavailable {
        container_id: String,
        #[source]
        source: DestinationError,
    },
    #[error("container {container_id} has no date-typed column")]
    NoDateColumn { container_id: String },
}

impl SchemaError {
    pub fn container_id(&self) -> &str {
        match self {
            SchemaError::SchemaUnavailable { container_id, .. } | SchemaError::NoDateColumn { container_id } => {
                container_id
            }
        }
    }
}

/// Per-date failure; the date is marked failed and the run moves on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetching {family} for {date}: {source}")]
    SourceFetch {
        family: MetricFamily,
        date: NaiveDate,
        #[source]
        source: SourceError,
    },
    #[error("looking up record for {date}: {source}")]
    DestinationRead {
        date: NaiveDate,
        #[source]
        source: DestinationError,
    },
    #[error("{operation} for {date}: {source}")]
    DestinationWrite {
        date: NaiveDate,
        operation: &'static str,
        #[source]
        source: DestinationError,
    },
}

impl SyncError {
    pub fn operation(&self) -> &'static str {
        match self {
            SyncError::SourceFetch { .. } => "fetch",
            SyncError::DestinationRead { .. } => "query",
            SyncError::DestinationWrite { operation, .. } => operation,
        }
    }
}

/// Failure that aborts a whole run before any container is processed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("source login failed: {0}")]
    Login(#[source] SourceError),
    #[error("source setup failed: {0}")]
    SourceSetup(#[source] SourceError),
    #[error("destination setup failed: {0}")]
    DestinationSetup(#[from] DestinationError),
}
