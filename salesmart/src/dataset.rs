use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use common::Result;
use datafusion::datasource::MemTable;
use datafusion::prelude::*;
use std::sync::Arc;

/// A named, immutable, in-memory relation.
///
/// Batches keep the order they were produced in, which for loaded tables is
/// the source scan order. Stages never modify a dataset; they build new ones.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self {
            name: name.into(),
            schema,
            batches,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Registers the dataset as an in-memory table named after it and returns
    /// a DataFrame over it. Re-registering replaces the previous table.
    pub async fn frame(&self, ctx: &SessionContext) -> Result<DataFrame> {
        let table = MemTable::try_new(self.schema.clone(), vec![self.batches.clone()])?;
        ctx.deregister_table(self.name.as_str())?;
        ctx.register_table(self.name.as_str(), Arc::new(table))?;
        Ok(ctx.table(self.name.as_str()).await?)
    }

    /// Materializes a DataFrame into a new dataset.
    pub async fn from_frame(name: impl Into<String>, df: DataFrame) -> Result<Self> {
        let plan_schema: SchemaRef = Arc::new(df.schema().as_arrow().clone());
        let batches = df.collect().await?;
        let schema = batches
            .first()
            .map(|b| b.schema())
            .unwrap_or(plan_schema);
        Ok(Self::new(name, schema, batches))
    }

    /// The same rows under another name.
    pub fn renamed(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }
}
