use arrow::array::{Array, AsArray};
use arrow::datatypes::Int64Type;
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use datafusion::scalar::ScalarValue;
use sha2::{Digest, Sha256};

/// Renders every row as `v1|v2|...` using the scalar display of each cell.
/// Nulls render as `NULL`.
pub fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<String>> {
    let mut rows = Vec::new();

    for batch in batches {
        for row_idx in 0..batch.num_rows() {
            let mut cells = Vec::with_capacity(batch.num_columns());
            for column in batch.columns() {
                cells.push(render_cell(column.as_ref(), row_idx)?);
            }
            rows.push(cells.join("|"));
        }
    }

    Ok(rows)
}

fn render_cell(array: &dyn Array, index: usize) -> Result<String> {
    if array.is_null(index) {
        return Ok("NULL".to_string());
    }
    let scalar = ScalarValue::try_from_array(array, index)?;
    Ok(scalar.to_string())
}

/// Order-insensitive content hash of a set of batches.
pub fn batches_checksum(batches: &[RecordBatch]) -> Result<String> {
    let mut rows = batches_to_rows(batches)?;
    rows.sort();

    let mut hasher = Sha256::new();
    hasher.update((rows.len() as u64).to_le_bytes());
    for row in &rows {
        hasher.update(row.as_bytes());
        hasher.update(b"\n");
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Collects an Int64 column across batches.
pub fn int64_column(batches: &[RecordBatch], column: &str) -> Result<Vec<Option<i64>>> {
    let mut values = Vec::new();

    for batch in batches {
        let idx = batch.schema().index_of(column)?;
        let array = batch
            .column(idx)
            .as_primitive_opt::<Int64Type>()
            .ok_or_else(|| {
                Error::SchemaMismatch(format!(
                    "Column {} is {:?}, expected Int64",
                    column,
                    batch.column(idx).data_type()
                ))
            })?;
        values.extend(array.iter());
    }

    Ok(values)
}

/// Reads a single Int64 aggregate cell (first row) from a result set.
pub fn scalar_i64(batches: &[RecordBatch], column: &str) -> Result<i64> {
    int64_column(batches, column)?
        .into_iter()
        .next()
        .flatten()
        .ok_or_else(|| Error::Other(format!("Aggregate column {} returned no value", column)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch(ids: Vec<Option<i64>>, labels: Vec<Option<&str>>, amounts: Vec<f64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("label", DataType::Utf8, true),
            Field::new("amount", DataType::Float64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(labels)),
                Arc::new(Float64Array::from(amounts)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rows_render_nulls_explicitly() {
        let rows = batches_to_rows(&[batch(vec![Some(1), None], vec![None, Some("b")], vec![1.5, 2.0])])
            .unwrap();
        assert_eq!(rows, vec!["1|NULL|1.5".to_string(), "NULL|b|2".to_string()]);
    }

    #[test]
    fn checksum_ignores_row_order() {
        let a = batch(vec![Some(1), Some(2)], vec![Some("a"), Some("b")], vec![1.0, 2.0]);
        let b = batch(vec![Some(2), Some(1)], vec![Some("b"), Some("a")], vec![2.0, 1.0]);
        assert_eq!(batches_checksum(&[a.clone()]).unwrap(), batches_checksum(&[b]).unwrap());

        let c = batch(vec![Some(1), Some(2)], vec![Some("a"), Some("b")], vec![1.0, 2.5]);
        assert_ne!(batches_checksum(&[a]).unwrap(), batches_checksum(&[c]).unwrap());
    }

    #[test]
    fn int64_column_rejects_wrong_type() {
        let b = batch(vec![Some(7)], vec![Some("x")], vec![0.0]);
        assert_eq!(int64_column(&[b.clone()], "id").unwrap(), vec![Some(7)]);
        assert!(int64_column(&[b], "label").is_err());
    }
}
