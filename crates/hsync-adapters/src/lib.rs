//! Source and destination adapter contracts plus their implementations.
//!
//! The reconciliation engine only talks to [`SourceAdapter`] and
//! [`DestinationAdapter`]; Garmin Connect and Notion are the production
//! implementations, the fixture source and in-memory destination back tests
//! and offline runs.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hsync_core::{
    ColumnSpec, ColumnWriteSet, ContainerCatalog, DailyMetricRecord, DestinationRecord,
    FilterPredicate, MetricFamily, WriteTarget,
};
use hsync_storage::HttpError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod dry_run;
pub mod fixture;
pub mod garmin;
pub mod memory;
pub mod notion;

pub use dry_run::DryRunDestination;
pub use fixture::FixtureSource;
pub use garmin::{GarminConfig, GarminSource, OAuth2Token};
pub use memory::MemoryDestination;
pub use notion::{NotionConfig, NotionDestination, DEFAULT_NOTION_VERSION};

pub const CRATE_NAME: &str = "hsync-adapters";

/// Authenticated source session established once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSession {
    /// Account handle some per-user endpoints are addressed by.
    pub display_name: Option<String>,
    pub established_at: DateTime<Utc>,
}

impl SourceSession {
    pub fn anonymous() -> Self {
        Self {
            display_name: None,
            established_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source authentication failed: {0}")]
    Auth(String),
    #[error("no {family} data for {date}")]
    NoData { family: MetricFamily, date: NaiveDate },
    #[error("malformed source payload: {0}")]
    Malformed(String),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn login(&self) -> Result<SourceSession, SourceError>;

    async fn fetch_metrics(
        &self,
        session: &SourceSession,
        family: MetricFamily,
        date: NaiveDate,
    ) -> Result<DailyMetricRecord, SourceError>;
}

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("destination API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("container {container_id} exposes no data source; use the original database, not a linked view")]
    NoDataSource { container_id: String },
    #[error("unknown container {0}")]
    UnknownContainer(String),
    #[error("malformed destination response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Transport(HttpError),
}

impl From<HttpError> for DestinationError {
    fn from(err: HttpError) -> Self {
        match (err.status(), err.body_json()) {
            (Some(status), Some(body)) => DestinationError::Api {
                status,
                code: body
                    .get("code")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                message: body
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            },
            (Some(status), None) => DestinationError::Api {
                status,
                code: "unknown".to_string(),
                message: err.to_string(),
            },
            _ => DestinationError::Transport(err),
        }
    }
}

#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    /// Column catalog of a container plus the target records are written to.
    async fn retrieve_schema(&self, container_id: &str) -> Result<ContainerCatalog, DestinationError>;

    /// Records matching every predicate.
    async fn query(
        &self,
        target: &WriteTarget,
        filter: &[FilterPredicate],
    ) -> Result<Vec<DestinationRecord>, DestinationError>;

    /// Creates a record and returns its id.
    async fn create(
        &self,
        target: &WriteTarget,
        properties: &ColumnWriteSet,
        icon: Option<&str>,
    ) -> Result<String, DestinationError>;

    async fn update(&self, record_id: &str, properties: &ColumnWriteSet) -> Result<(), DestinationError>;

    /// Adds columns to the container schema.
    async fn add_columns(&self, target: &WriteTarget, columns: &[ColumnSpec]) -> Result<(), DestinationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_errors_become_api_errors() {
        let err = HttpError::Status {
            status: 400,
            url: "https://api.notion.com/v1/pages".into(),
            body: r#"{"object":"error","code":"validation_error","message":"Score is not a property that exists."}"#.into(),
        };
        match DestinationError::from(err) {
            DestinationError::Api { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "validation_error");
                assert!(message.contains("Score"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_json_error_body_keeps_status() {
        let err = HttpError::Status {
            status: 502,
            url: "https://api.notion.com/v1/pages".into(),
            body: "<html>bad gateway</html>".into(),
        };
        assert!(matches!(
            DestinationError::from(err),
            DestinationError::Api { status: 502, .. }
        ));
    }
}
