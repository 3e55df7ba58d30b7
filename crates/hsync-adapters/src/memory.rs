use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use hsync_core::{
    ColumnDef, ColumnSpec, ColumnType, ColumnWriteSet, ContainerCatalog, DestinationRecord,
    FilterPredicate, PropertyValue, WriteTarget,
};

use crate::{DestinationAdapter, DestinationError};

/// Call counters recorded by [`MemoryDestination`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub schema_reads: usize,
    pub queries: usize,
    pub creates: usize,
    pub updates: usize,
    pub add_columns: usize,
}

impl CallCounts {
    pub fn writes(&self) -> usize {
        self.creates + self.updates
    }
}

#[derive(Debug, Default)]
struct MemoryContainer {
    catalog: Option<ContainerCatalog>,
    records: Vec<DestinationRecord>,
}

#[derive(Debug, Default)]
struct MemoryState {
    containers: BTreeMap<String, MemoryContainer>,
    next_id: usize,
    counts: CallCounts,
    last_update: Option<ColumnWriteSet>,
    failing_dates: BTreeSet<String>,
    reject_add_columns: bool,
}

impl MemoryState {
    fn container_for_target(&mut self, target: &WriteTarget) -> Result<&mut MemoryContainer, DestinationError> {
        self.containers
            .values_mut()
            .find(|c| c.catalog.as_ref().map(|cat| &cat.target) == Some(target))
            .ok_or_else(|| DestinationError::UnknownContainer(target.id().to_string()))
    }

    fn check_write_allowed(&self, properties: &ColumnWriteSet) -> Result<(), DestinationError> {
        let failing = properties.iter().any(|(_, value)| {
            matches!(value, PropertyValue::Date(d) if self.failing_dates.contains(d))
        });
        if failing {
            return Err(DestinationError::Api {
                status: 503,
                code: "service_unavailable".to_string(),
                message: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

fn unknown_column_error(name: &str) -> DestinationError {
    DestinationError::Api {
        status: 400,
        code: "validation_error".to_string(),
        message: format!("{name} is not a property that exists."),
    }
}

/// In-process destination that behaves like a single-data-source Notion
/// workspace. Writes to columns missing from the catalog are rejected the way
/// the real API rejects them.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    state: Mutex<MemoryState>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a container with the given `(name, type)` columns.
    pub fn with_container(self, container_id: &str, columns: &[(&str, ColumnType)]) -> Self {
        let catalog = ContainerCatalog {
            container_id: container_id.to_string(),
            title: Some(container_id.to_string()),
            target: WriteTarget::DataSource(format!("{container_id}-ds")),
            columns: columns
                .iter()
                .enumerate()
                .map(|(i, (name, column_type))| ColumnDef {
                    name: name.to_string(),
                    id: format!("col{i}"),
                    column_type: column_type.clone(),
                })
                .collect(),
        };
        self.state().containers.insert(
            container_id.to_string(),
            MemoryContainer {
                catalog: Some(catalog),
                records: Vec::new(),
            },
        );
        self
    }

    /// Registers a linked view: readable, but with no data source behind it.
    pub fn with_linked_view(self, container_id: &str) -> Self {
        self.state()
            .containers
            .insert(container_id.to_string(), MemoryContainer::default());
        self
    }

    /// Makes every write carrying `date` as a date value fail.
    pub fn fail_writes_for_date(self, date: &str) -> Self {
        self.state().failing_dates.insert(date.to_string());
        self
    }

    pub fn reject_add_columns(self) -> Self {
        self.state().reject_add_columns = true;
        self
    }

    /// Seeds an existing record and returns its id.
    pub fn insert_record(&self, container_id: &str, properties: ColumnWriteSet) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("page-{}", state.next_id);
        let container = state.containers.entry(container_id.to_string()).or_default();
        container.records.push(DestinationRecord {
            id: id.clone(),
            properties: properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        });
        id
    }

    pub fn records(&self, container_id: &str) -> Vec<DestinationRecord> {
        self.state()
            .containers
            .get(container_id)
            .map(|c| c.records.clone())
            .unwrap_or_default()
    }

    pub fn column_names(&self, container_id: &str) -> Vec<String> {
        self.state()
            .containers
            .get(container_id)
            .and_then(|c| c.catalog.as_ref())
            .map(|cat| cat.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn counts(&self) -> CallCounts {
        self.state().counts
    }

    /// Property set sent by the most recent update.
    pub fn last_update(&self) -> Option<ColumnWriteSet> {
        self.state().last_update.clone()
    }
}

#[async_trait]
impl DestinationAdapter for MemoryDestination {
    async fn retrieve_schema(&self, container_id: &str) -> Result<ContainerCatalog, DestinationError> {
        let mut state = self.state();
        state.counts.schema_reads += 1;
        let container = state
            .containers
            .get(container_id)
            .ok_or_else(|| DestinationError::Api {
                status: 404,
                code: "object_not_found".to_string(),
                message: format!("Could not find database with ID: {container_id}."),
            })?;
        container
            .catalog
            .clone()
            .ok_or_else(|| DestinationError::NoDataSource {
                container_id: container_id.to_string(),
            })
    }

    async fn query(
        &self,
        target: &WriteTarget,
        filter: &[FilterPredicate],
    ) -> Result<Vec<DestinationRecord>, DestinationError> {
        let mut state = self.state();
        state.counts.queries += 1;
        let container = state.container_for_target(target)?;
        Ok(container
            .records
            .iter()
            .filter(|record| {
                filter
                    .iter()
                    .all(|p| record.properties.get(&p.column) == Some(&p.value))
            })
            .take(2)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        target: &WriteTarget,
        properties: &ColumnWriteSet,
        _icon: Option<&str>,
    ) -> Result<String, DestinationError> {
        let mut state = self.state();
        state.counts.creates += 1;
        state.check_write_allowed(properties)?;
        state.next_id += 1;
        let id = format!("page-{}", state.next_id);
        let container = state.container_for_target(target)?;
        if let Some(catalog) = &container.catalog {
            if let Some(name) = properties.column_names().into_iter().find(|n| catalog.column(n).is_none()) {
                return Err(unknown_column_error(&name));
            }
        }
        container.records.push(DestinationRecord {
            id: id.clone(),
            properties: properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        });
        Ok(id)
    }

    async fn update(&self, record_id: &str, properties: &ColumnWriteSet) -> Result<(), DestinationError> {
        let mut state = self.state();
        state.counts.updates += 1;
        state.check_write_allowed(properties)?;
        state.last_update = Some(properties.clone());
        let container = state
            .containers
            .values_mut()
            .find(|c| c.records.iter().any(|r| r.id == record_id))
            .ok_or_else(|| DestinationError::Api {
                status: 404,
                code: "object_not_found".to_string(),
                message: format!("Could not find page with ID: {record_id}."),
            })?;
        if let Some(catalog) = &container.catalog {
            if let Some(name) = properties.column_names().into_iter().find(|n| catalog.column(n).is_none()) {
                return Err(unknown_column_error(&name));
            }
        }
        if let Some(record) = container.records.iter_mut().find(|r| r.id == record_id) {
            for (name, value) in properties.iter() {
                record.properties.insert(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn add_columns(&self, target: &WriteTarget, columns: &[ColumnSpec]) -> Result<(), DestinationError> {
        let mut state = self.state();
        state.counts.add_columns += 1;
        if state.reject_add_columns {
            return Err(DestinationError::Api {
                status: 403,
                code: "restricted_resource".to_string(),
                message: "integration cannot update this schema".to_string(),
            });
        }
        let container = state.container_for_target(target)?;
        if let Some(catalog) = container.catalog.as_mut() {
            for spec in columns {
                if catalog.column(&spec.name).is_none() {
                    let id = format!("col{}", catalog.columns.len());
                    catalog.columns.push(ColumnDef {
                        name: spec.name.clone(),
                        id,
                        column_type: spec.column_type.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
