use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use hsync_core::{DailyMetricRecord, MetricFamily};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{SourceAdapter, SourceError, SourceSession};

/// Offline source reading `<root>/<family>/<YYYY-MM-DD>.json`.
///
/// Each file holds the payload exactly as the live source would return it for
/// that family, so captured artifacts can be replayed.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    root: PathBuf,
}

impl FixtureSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, family: MetricFamily, date: NaiveDate) -> PathBuf {
        self.root
            .join(family.as_str())
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl SourceAdapter for FixtureSource {
    fn source_id(&self) -> &'static str {
        "fixtures"
    }

    async fn login(&self) -> Result<SourceSession, SourceError> {
        Ok(SourceSession::anonymous())
    }

    async fn fetch_metrics(
        &self,
        _session: &SourceSession,
        family: MetricFamily,
        date: NaiveDate,
    ) -> Result<DailyMetricRecord, SourceError> {
        let path = self.path_for(family, date);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "fixture missing");
                return Err(SourceError::NoData { family, date });
            }
            Err(source) => {
                return Err(SourceError::Io {
                    context: format!("reading fixture {}", path.display()),
                    source,
                })
            }
        };
        let payload: JsonValue = serde_json::from_str(&text)
            .map_err(|e| SourceError::Malformed(format!("{}: {e}", path.display())))?;
        Ok(DailyMetricRecord {
            family,
            date,
            payload,
        })
    }
}
