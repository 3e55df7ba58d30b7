//! One sync run: login, then every configured container over the window.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use hsync_adapters::{DestinationAdapter, GarminSource, NotionDestination, SourceAdapter};
use hsync_core::{MetricFamily, SyncOutcome};
use hsync_storage::{run_stamp, ArtifactStore};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::errors::RunError;
use crate::report::write_run_report;
use crate::schema::SchemaCache;
use crate::upsert::{DateResult, UpsertEngine};
use crate::window::lookback_window;

#[derive(Debug, Clone, Serialize)]
pub struct DateSummary {
    pub date: NaiveDate,
    /// `Created`, `Updated`, `Unchanged` or `Failed: <reason>`.
    pub outcome: String,
    pub failed: bool,
}

impl From<&DateResult> for DateSummary {
    fn from(result: &DateResult) -> Self {
        Self {
            date: result.date,
            outcome: result.label(),
            failed: result.is_failure(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub family: MetricFamily,
    pub container_id: String,
    /// Set when the container's schema could not be resolved.
    pub schema_error: Option<String>,
    pub dates: Vec<DateSummary>,
}

impl ContainerSummary {
    pub fn count(&self, outcome: SyncOutcome) -> usize {
        let label = outcome.to_string();
        self.dates.iter().filter(|d| d.outcome == label).count()
    }

    pub fn failed_dates(&self) -> usize {
        self.dates.iter().filter(|d| d.failed).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub containers: Vec<ContainerSummary>,
    pub report_dir: Option<PathBuf>,
}

impl RunSummary {
    /// Directory name of this run's report.
    pub fn label(&self) -> String {
        let id = self.run_id.simple().to_string();
        format!("{}_{}", run_stamp(self.started_at), &id[..8])
    }

    pub fn schema_failures(&self) -> usize {
        self.containers.iter().filter(|c| c.schema_error.is_some()).count()
    }

    pub fn date_failures(&self) -> usize {
        self.containers.iter().map(ContainerSummary::failed_dates).sum()
    }

    pub fn total(&self, outcome: SyncOutcome) -> usize {
        self.containers.iter().map(|c| c.count(outcome)).sum()
    }

    /// Non-zero only when a container could not be synced at all.
    pub fn exit_code(&self) -> i32 {
        if self.schema_failures() > 0 {
            1
        } else {
            0
        }
    }
}

pub struct SyncPipeline {
    config: SyncConfig,
    source: Box<dyn SourceAdapter>,
    destination: Box<dyn DestinationAdapter>,
    artifacts: Option<ArtifactStore>,
    /// Held for the whole run, so runs in one process never overlap.
    cache: Mutex<SchemaCache>,
    dry_run: bool,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig, source: Box<dyn SourceAdapter>, destination: Box<dyn DestinationAdapter>) -> Self {
        let artifacts = config.artifacts_dir.clone().map(ArtifactStore::new);
        Self {
            config,
            source,
            destination,
            artifacts,
            cache: Mutex::new(SchemaCache::new()),
            dry_run: false,
        }
    }

    /// Garmin source and Notion destination built from configuration.
    pub fn from_config(config: SyncConfig) -> Result<Self, RunError> {
        let garmin = config.garmin_config().map_err(RunError::SourceSetup)?;
        let source = GarminSource::new(garmin).map_err(RunError::SourceSetup)?;
        let destination = NotionDestination::new(config.notion_config())?;
        Ok(Self::new(config, Box::new(source), Box::new(destination)))
    }

    /// Marks summaries as dry runs; the caller supplies a non-writing destination.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn window(&self, now: DateTime<Utc>) -> Vec<NaiveDate> {
        lookback_window(self.config.time_zone, now, self.config.lookback_days)
    }

    /// Syncs the lookback window ending yesterday.
    pub async fn run_once(&self) -> Result<RunSummary, RunError> {
        let dates = self.window(Utc::now());
        self.run_dates(&dates).await
    }

    /// Like [`run_once`](Self::run_once) but returns `None` when a run is
    /// already in progress.
    pub async fn try_run_once(&self) -> Option<Result<RunSummary, RunError>> {
        let mut cache = self.cache.try_lock().ok()?;
        let dates = self.window(Utc::now());
        Some(self.run_locked(&mut cache, &dates).await)
    }

    pub async fn run_dates(&self, dates: &[NaiveDate]) -> Result<RunSummary, RunError> {
        let mut cache = self.cache.lock().await;
        self.run_locked(&mut cache, dates).await
    }

    async fn run_locked(&self, cache: &mut SchemaCache, dates: &[NaiveDate]) -> Result<RunSummary, RunError> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, source = self.source.source_id(), dates = dates.len(), dry_run = self.dry_run, "sync run started");

        let session = self.source.login().await.map_err(RunError::Login)?;
        let engine = UpsertEngine::new(self.source.as_ref(), self.destination.as_ref(), &session)
            .with_artifacts(self.artifacts.as_ref());

        let mut containers = Vec::new();
        for (family, container_id) in &self.config.containers {
            let family = *family;
            let schema = match cache
                .resolve(
                    self.destination.as_ref(),
                    family,
                    container_id,
                    self.config.create_missing_properties,
                )
                .await
            {
                Ok(schema) => schema,
                Err(err) => {
                    error!(%family, container = %container_id, error = %err, "container skipped");
                    containers.push(ContainerSummary {
                        family,
                        container_id: container_id.clone(),
                        schema_error: Some(err.to_string()),
                        dates: Vec::new(),
                    });
                    continue;
                }
            };

            let results = engine.sync_range(family, dates, &schema).await;
            containers.push(ContainerSummary {
                family,
                container_id: container_id.clone(),
                schema_error: None,
                dates: results.iter().map(DateSummary::from).collect(),
            });
        }

        let mut summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            containers,
            report_dir: None,
        };

        if let Some(reports_dir) = &self.config.reports_dir {
            match write_run_report(reports_dir, &summary).await {
                Ok(dir) => summary.report_dir = Some(dir),
                Err(err) => warn!(error = %err, "failed to write run report"),
            }
        }

        info!(
            %run_id,
            created = summary.total(SyncOutcome::Created),
            updated = summary.total(SyncOutcome::Updated),
            unchanged = summary.total(SyncOutcome::Unchanged),
            failed_dates = summary.date_failures(),
            failed_containers = summary.schema_failures(),
            "sync run finished"
        );
        Ok(summary)
    }
}
