use async_trait::async_trait;
use hsync_core::{ColumnSpec, ColumnWriteSet, ContainerCatalog, DestinationRecord, FilterPredicate, WriteTarget};
use tracing::info;

use crate::{DestinationAdapter, DestinationError};

/// Reads through to the wrapped destination and logs writes instead of
/// performing them.
pub struct DryRunDestination<D> {
    inner: D,
}

impl<D> DryRunDestination<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

#[async_trait]
impl<D: DestinationAdapter> DestinationAdapter for DryRunDestination<D> {
    async fn retrieve_schema(&self, container_id: &str) -> Result<ContainerCatalog, DestinationError> {
        self.inner.retrieve_schema(container_id).await
    }

    async fn query(
        &self,
        target: &WriteTarget,
        filter: &[FilterPredicate],
    ) -> Result<Vec<DestinationRecord>, DestinationError> {
        self.inner.query(target, filter).await
    }

    async fn create(
        &self,
        target: &WriteTarget,
        properties: &ColumnWriteSet,
        icon: Option<&str>,
    ) -> Result<String, DestinationError> {
        info!(
            target = %target.id(),
            columns = ?properties.column_names(),
            icon = icon.unwrap_or_default(),
            "dry run: would create record"
        );
        Ok("dry-run".to_string())
    }

    async fn update(&self, record_id: &str, properties: &ColumnWriteSet) -> Result<(), DestinationError> {
        info!(record = %record_id, columns = ?properties.column_names(), "dry run: would update record");
        Ok(())
    }

    async fn add_columns(&self, target: &WriteTarget, columns: &[ColumnSpec]) -> Result<(), DestinationError> {
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        info!(target = %target.id(), columns = ?names, "dry run: would add columns");
        Ok(())
    }
}
