use crate::dataset::Dataset;
use crate::schema::{get_weekly_sales_schema, validate_schema};
use crate::storage::SinkStore;
use crate::utils::arrow::batches_checksum;
use common::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    pub table: String,
    pub rows_appended: u64,
    pub rows_before: u64,
    /// sha256 over the sorted row rendering of the published aggregate.
    pub checksum: String,
}

/// Appends the weekly aggregate to the sink table. Never deletes or
/// overwrites, so publishing the same aggregate twice duplicates it.
pub struct SinkPublisher {
    sink: Arc<dyn SinkStore>,
    table: String,
}

impl SinkPublisher {
    pub fn new(sink: Arc<dyn SinkStore>, table: impl Into<String>) -> Self {
        Self {
            sink,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn publish(&self, aggregate: &Dataset) -> Result<PublishResult> {
        validate_schema(&aggregate.schema(), get_weekly_sales_schema()).map_err(|e| {
            Error::SinkWriteRejected {
                table: self.table.clone(),
                reason: e.to_string(),
            }
        })?;

        let rows_before = self.sink.row_count(&self.table).await?;
        if rows_before > 0 {
            warn!(
                table = %self.table,
                rows_before,
                "Sink table already holds rows, appending anyway"
            );
        }

        let checksum = batches_checksum(aggregate.batches())?;
        let rows_appended = self.sink.append(&self.table, aggregate.batches()).await?;

        info!(
            table = %self.table,
            rows_appended,
            checksum = %checksum,
            "Published weekly sales"
        );

        Ok(PublishResult {
            table: self.table.clone(),
            rows_appended,
            rows_before,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::storage::SqliteSink;
    use arrow::array::{ArrayRef, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    fn weekly() -> Dataset {
        let batch = fixtures::weekly_sales_batch(&[
            (1, 100, 1, 7, "SALE", 8.0, 30.0, 5.0),
            (1, 101, 1, 7, "SALE", 1.0, 12.5, 0.0),
        ]);
        Dataset::new("weekly_sales", batch.schema(), vec![batch])
    }

    #[tokio::test]
    async fn republishing_duplicates_rows() {
        let sink = Arc::new(SqliteSink::open_in_memory().await.unwrap());
        let publisher = SinkPublisher::new(sink.clone(), "mview_weekly_sales");

        let first = publisher.publish(&weekly()).await.unwrap();
        assert_eq!(first.rows_before, 0);
        assert_eq!(first.rows_appended, 2);

        let second = publisher.publish(&weekly()).await.unwrap();
        assert_eq!(second.rows_before, 2);
        assert_eq!(second.checksum, first.checksum);
        assert_eq!(sink.row_count("mview_weekly_sales").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn wrong_schema_is_rejected_before_writing() {
        let sink = Arc::new(SqliteSink::open_in_memory().await.unwrap());
        let schema = Arc::new(Schema::new(vec![Field::new("pos_site_id", DataType::Int64, true)]));
        let ids: ArrayRef = Arc::new(Int64Array::from(vec![1]));
        let batch = RecordBatch::try_new(schema.clone(), vec![ids]).unwrap();
        let dataset = Dataset::new("weekly_sales", schema, vec![batch]);

        let err = SinkPublisher::new(sink.clone(), "mview_weekly_sales")
            .publish(&dataset)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SinkWriteRejected { .. }));
        assert_eq!(sink.row_count("mview_weekly_sales").await.unwrap(), 0);
    }
}
