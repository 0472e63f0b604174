use crate::catalog::{TableCatalog, TableRef, view_name};
use crate::dataset::Dataset;
use crate::schema::get_source_schema;
use crate::storage::SourceStore;
use arrow::datatypes::Schema;
use common::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Staging views keyed by source table name.
pub type StagedTables = BTreeMap<String, Dataset>;

/// Reads catalog tables from the source store into staging datasets.
pub struct Loader {
    source: Arc<dyn SourceStore>,
}

impl Loader {
    pub fn new(source: Arc<dyn SourceStore>) -> Self {
        Self { source }
    }

    /// Full scan of one table. The dataset is named after its staging view.
    pub async fn load(&self, table: &TableRef, pinned: Option<&Schema>) -> Result<Dataset> {
        let dataset = self.source.read_table(table, pinned).await?;
        Ok(dataset.renamed(view_name(&table.table)))
    }

    /// Loads every catalog entry in catalog order.
    pub async fn load_all(&self, catalog: &TableCatalog) -> Result<StagedTables> {
        let mut staged = StagedTables::new();

        for entry in catalog.entries() {
            let table = catalog.table_ref(entry);
            let dataset = self.load(&table, get_source_schema(entry.table)).await?;
            info!(
                table = %table,
                view = dataset.name(),
                rows = dataset.num_rows(),
                "Loaded staging view"
            );
            staged.insert(entry.table.to_string(), dataset);
        }

        Ok(staged)
    }
}
