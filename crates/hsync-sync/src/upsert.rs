//! Per-date create / update / no-op reconciliation.

use chrono::NaiveDate;
use hsync_adapters::{DestinationAdapter, SourceAdapter, SourceSession};
use hsync_core::{
    ColumnType, DestinationSchema, FilterPredicate, MetricFamily, PropertyValue, SyncOutcome,
};
use hsync_storage::ArtifactStore;
use tracing::{info, warn};

use crate::detect::changed_columns;
use crate::errors::SyncError;
use crate::mapper::map_record;

/// Outcome of one date within a range.
#[derive(Debug)]
pub struct DateResult {
    pub date: NaiveDate,
    pub outcome: Result<SyncOutcome, SyncError>,
}

impl DateResult {
    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    /// `Created`, `Updated`, `Unchanged` or `Failed: <reason>`.
    pub fn label(&self) -> String {
        match &self.outcome {
            Ok(outcome) => outcome.to_string(),
            Err(err) => format!("Failed: {err}"),
        }
    }
}

fn date_value(date: NaiveDate) -> PropertyValue {
    PropertyValue::Date(date.format("%Y-%m-%d").to_string())
}

/// Query predicates locating the record for `date`.
pub fn lookup_filter(family: MetricFamily, date: NaiveDate, schema: &DestinationSchema) -> Vec<FilterPredicate> {
    let mut filter = vec![FilterPredicate {
        column: schema.date_column.clone(),
        column_type: ColumnType::Date,
        value: date_value(date),
    }];
    if let Some(title) = family.discriminator() {
        filter.push(FilterPredicate {
            column: schema.title_column.clone(),
            column_type: ColumnType::Title,
            value: PropertyValue::Title(title.to_string()),
        });
    }
    filter
}

pub struct UpsertEngine<'a> {
    source: &'a dyn SourceAdapter,
    destination: &'a dyn DestinationAdapter,
    session: &'a SourceSession,
    artifacts: Option<&'a ArtifactStore>,
}

impl<'a> UpsertEngine<'a> {
    pub fn new(
        source: &'a dyn SourceAdapter,
        destination: &'a dyn DestinationAdapter,
        session: &'a SourceSession,
    ) -> Self {
        Self {
            source,
            destination,
            session,
            artifacts: None,
        }
    }

    /// Stores every fetched payload before it is mapped.
    pub fn with_artifacts(mut self, artifacts: Option<&'a ArtifactStore>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub async fn sync_date(
        &self,
        family: MetricFamily,
        date: NaiveDate,
        schema: &DestinationSchema,
    ) -> Result<SyncOutcome, SyncError> {
        let record = self
            .source
            .fetch_metrics(self.session, family, date)
            .await
            .map_err(|source| SyncError::SourceFetch { family, date, source })?;

        if let Some(store) = self.artifacts {
            if let Err(err) = store.store_payload(date, family.as_str(), &record.payload).await {
                warn!(%family, %date, error = %err, "failed to capture raw payload");
            }
        }

        // Title and date are written last so a mapped value never replaces them.
        let mut candidate = map_record(&record, schema);
        candidate.insert(schema.title_column.clone(), PropertyValue::Title(family.title_for(date)));
        candidate.insert(schema.date_column.clone(), date_value(date));

        let matches = self
            .destination
            .query(&schema.target, &lookup_filter(family, date, schema))
            .await
            .map_err(|source| SyncError::DestinationRead { date, source })?;

        let Some(existing) = matches.first() else {
            self.destination
                .create(&schema.target, &candidate, family.icon())
                .await
                .map_err(|source| SyncError::DestinationWrite {
                    date,
                    operation: "create",
                    source,
                })?;
            return Ok(SyncOutcome::Created);
        };
        if matches.len() > 1 {
            warn!(
                %family,
                container = %schema.container_id,
                %date,
                record = %existing.id,
                "more than one record for date; updating the first"
            );
        }

        let changed = changed_columns(existing, &candidate);
        if changed.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }
        self.destination
            .update(&existing.id, &changed)
            .await
            .map_err(|source| SyncError::DestinationWrite {
                date,
                operation: "update",
                source,
            })?;
        Ok(SyncOutcome::Updated)
    }

    /// Syncs `dates` oldest first. A failed date does not stop the range.
    pub async fn sync_range(
        &self,
        family: MetricFamily,
        dates: &[NaiveDate],
        schema: &DestinationSchema,
    ) -> Vec<DateResult> {
        let mut ordered = dates.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut results = Vec::with_capacity(ordered.len());
        for date in ordered {
            let outcome = self.sync_date(family, date, schema).await;
            match &outcome {
                Ok(outcome) => info!(
                    %family,
                    container = %schema.container_id,
                    %date,
                    outcome = %outcome,
                    "date synced"
                ),
                Err(err) => warn!(
                    %family,
                    container = %schema.container_id,
                    %date,
                    operation = err.operation(),
                    error = %err,
                    "date failed"
                ),
            }
            results.push(DateResult { date, outcome });
        }
        results
    }
}
