pub mod convert;
pub mod sqlite;

use crate::catalog::TableRef;
use crate::dataset::Dataset;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use common::Result;

pub use sqlite::{SqliteSink, SqliteSource};

/// Read side of the source relational store.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Full scan of `table`. The returned dataset is named after the table.
    ///
    /// `pinned` overrides the declared SQL type for the columns it names.
    async fn read_table(
        &self,
        table: &TableRef,
        pinned: Option<&arrow::datatypes::Schema>,
    ) -> Result<Dataset>;
}

/// Write side of the sink relational store.
#[async_trait]
pub trait SinkStore: Send + Sync {
    /// Appends every row of `batches` to `table`, creating the table from the
    /// batch schema if it does not exist. Returns the number of rows written.
    async fn append(&self, table: &str, batches: &[RecordBatch]) -> Result<u64>;

    /// Drops `table` if present, recreates it from `schema` and writes
    /// `batches`, all in one transaction. Returns the number of rows written.
    async fn replace(
        &self,
        table: &str,
        schema: &arrow::datatypes::Schema,
        batches: &[RecordBatch],
    ) -> Result<u64>;

    /// Current row count of `table`; 0 when the table does not exist.
    async fn row_count(&self, table: &str) -> Result<u64>;
}
