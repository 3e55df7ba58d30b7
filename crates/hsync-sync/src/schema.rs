//! Column-role resolution and the per-run schema cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use hsync_adapters::DestinationAdapter;
use hsync_core::{
    ColumnSpec, ColumnType, ContainerCatalog, DestinationSchema, MetricFamily, MetricKey, DATE_COLUMN,
    FALLBACK_TITLE_COLUMN,
};
use tracing::{debug, info, warn};

use crate::errors::SchemaError;

/// Derives column roles from a container's catalog.
///
/// The capability set covers every known metric, not just one family's, so a
/// resolved schema does not depend on which family asked for it.
pub fn resolve_catalog(catalog: &ContainerCatalog) -> Result<DestinationSchema, SchemaError> {
    let title_column = catalog
        .columns
        .iter()
        .find(|c| c.column_type == ColumnType::Title)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| FALLBACK_TITLE_COLUMN.to_string());

    let timestamp_columns = [MetricKey::Bedtime.column_name(), MetricKey::WakeTime.column_name()];
    let date_typed = || catalog.columns.iter().filter(|c| c.column_type == ColumnType::Date);
    let date_column = catalog
        .column(DATE_COLUMN)
        .filter(|c| c.column_type == ColumnType::Date)
        .or_else(|| date_typed().find(|c| !timestamp_columns.contains(&c.name.as_str())))
        .or_else(|| date_typed().next())
        .map(|c| c.name.clone())
        .ok_or_else(|| SchemaError::NoDateColumn {
            container_id: catalog.container_id.clone(),
        })?;

    let mut metrics = BTreeMap::new();
    for metric in MetricKey::ALL {
        let Some(column) = catalog.column(metric.column_name()) else {
            continue;
        };
        if column.name == date_column {
            // The record date owns this column; a metric value would break lookups.
            debug!(container = %catalog.container_id, column = %column.name, "metric column is the date column; not writing it");
            continue;
        }
        if column.column_type == metric.column_type() {
            metrics.insert(metric, column.name.clone());
        } else {
            warn!(
                container = %catalog.container_id,
                column = %column.name,
                expected = %metric.column_type(),
                actual = %column.column_type,
                "column has unexpected type; metric will not be written"
            );
        }
    }

    Ok(DestinationSchema {
        container_id: catalog.container_id.clone(),
        target: catalog.target.clone(),
        title_column,
        date_column,
        metrics,
    })
}

/// Standard columns of `family` absent from `catalog`. Present columns with a
/// different type are left alone and logged.
pub fn missing_standard_columns(family: MetricFamily, catalog: &ContainerCatalog) -> Vec<ColumnSpec> {
    let mut missing = Vec::new();
    for spec in family.standard_columns() {
        match catalog.column(&spec.name) {
            None => missing.push(spec),
            Some(existing) if existing.column_type != spec.column_type => {
                warn!(
                    container = %catalog.container_id,
                    column = %spec.name,
                    expected = %spec.column_type,
                    actual = %existing.column_type,
                    "standard column exists with a different type; leaving it untouched"
                );
            }
            Some(_) => {}
        }
    }
    missing
}

/// Resolved schemas keyed by container id, reused across a run.
///
/// A container shared by several families is provisioned once per family.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: HashMap<String, CachedSchema>,
}

#[derive(Debug)]
struct CachedSchema {
    schema: DestinationSchema,
    provisioned: BTreeSet<MetricFamily>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached schema or reads, optionally provisions, and resolves it.
    /// Failures are not cached.
    pub async fn resolve(
        &mut self,
        destination: &dyn DestinationAdapter,
        family: MetricFamily,
        container_id: &str,
        provision: bool,
    ) -> Result<DestinationSchema, SchemaError> {
        if let Some(cached) = self.entries.get(container_id) {
            if !provision || cached.provisioned.contains(&family) {
                debug!(container = %container_id, "schema cache hit");
                return Ok(cached.schema.clone());
            }
        }

        let unavailable = |source| SchemaError::SchemaUnavailable {
            container_id: container_id.to_string(),
            source,
        };
        let mut catalog = destination.retrieve_schema(container_id).await.map_err(unavailable)?;

        if provision {
            let missing = missing_standard_columns(family, &catalog);
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(|c| c.name.as_str()).collect();
                match destination.add_columns(&catalog.target, &missing).await {
                    Ok(()) => {
                        info!(container = %container_id, %family, columns = ?names, "provisioned missing columns");
                        catalog = destination.retrieve_schema(container_id).await.map_err(unavailable)?;
                    }
                    Err(err) => {
                        warn!(
                            container = %container_id,
                            %family,
                            columns = ?names,
                            error = %err,
                            "could not provision missing columns; continuing with existing schema"
                        );
                    }
                }
            }
        }

        let schema = resolve_catalog(&catalog)?;
        debug!(
            container = %container_id,
            title = %schema.title_column,
            date = %schema.date_column,
            metrics = schema.metrics.len(),
            "resolved schema"
        );
        let mut provisioned = self
            .entries
            .remove(container_id)
            .map(|cached| cached.provisioned)
            .unwrap_or_default();
        if provision {
            provisioned.insert(family);
        }
        self.entries.insert(
            container_id.to_string(),
            CachedSchema {
                schema: schema.clone(),
                provisioned,
            },
        );
        Ok(schema)
    }
}
