use crate::dataset::Dataset;
use crate::processor::normalize::Dimensions;
use crate::storage::SinkStore;
use common::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Rewrites the per-run intermediate tables in the sink: every dimension and
/// the curated facts, each under `<prefix><dataset name>`.
///
/// Unlike the weekly aggregate these tables are replaced on every run, so
/// they always reflect the latest normalization.
pub struct StagingWriter {
    sink: Arc<dyn SinkStore>,
    prefix: String,
}

impl StagingWriter {
    pub fn new(sink: Arc<dyn SinkStore>, prefix: impl Into<String>) -> Self {
        Self {
            sink,
            prefix: prefix.into(),
        }
    }

    pub fn table_for(&self, dataset: &Dataset) -> String {
        format!("{}{}", self.prefix, dataset.name())
    }

    /// Returns rows written per staging table.
    pub async fn persist(
        &self,
        dimensions: &Dimensions,
        curated: &Dataset,
    ) -> Result<BTreeMap<String, u64>> {
        let mut written = BTreeMap::new();

        let datasets = dimensions.iter().map(|d| d.dataset()).chain([curated]);
        for dataset in datasets {
            let table = self.table_for(dataset);
            let rows = self
                .sink
                .replace(&table, &dataset.schema(), dataset.batches())
                .await?;
            written.insert(table, rows);
        }

        info!(
            tables = written.len(),
            rows = written.values().sum::<u64>(),
            "Persisted staging tables"
        );
        Ok(written)
    }
}
