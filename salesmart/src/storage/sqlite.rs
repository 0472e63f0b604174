//! SQLite-backed source and sink stores.
//!
//! Both wrap a single [`tokio_rusqlite::Connection`], so every statement runs
//! on the connection's own thread and the handle is released when the store
//! is dropped.

use super::convert::{
    arrow_type_for_declared, column_from_rows, declared_type_for_arrow, sql_value_from_array,
};
use super::{SinkStore, SourceStore};
use crate::catalog::TableRef;
use crate::dataset::Dataset;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use async_trait::async_trait;
use common::{Error, Result};
use rusqlite::OpenFlags;
use rusqlite::types::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

type TableScan = Option<(Vec<(String, String)>, Vec<Vec<Value>>)>;

pub struct SqliteSource {
    conn: tokio_rusqlite::Connection,
}

impl SqliteSource {
    /// Opens an existing database read-only. A missing file is an error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = tokio_rusqlite::Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .await
        .map_err(|e| {
            Error::SourceUnavailable(format!(
                "cannot open source database {}: {}",
                path.display(),
                e
            ))
        })?;
        info!(path = %path.display(), "Opened source store");
        Ok(Self { conn })
    }

    /// Opens an empty in-memory database, writable so tests can seed it.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| Error::SourceUnavailable(e.to_string()))?;
        Ok(Self { conn })
    }

    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(|e| Error::SourceUnavailable(e.to_string()))
    }
}

#[async_trait]
impl SourceStore for SqliteSource {
    async fn read_table(&self, table: &TableRef, pinned: Option<&Schema>) -> Result<Dataset> {
        let info_sql = format!(
            "PRAGMA {}.table_info({})",
            quote_ident(&table.schema),
            quote_ident(&table.table)
        );
        let select_sql = format!(
            "SELECT * FROM {}.{}",
            quote_ident(&table.schema),
            quote_ident(&table.table)
        );

        let scan: TableScan = self
            .conn
            .call(move |conn| {
                let columns = {
                    let mut stmt = conn.prepare(&info_sql)?;
                    let columns = stmt
                        .query_map([], |row| {
                            Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                        })?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    columns
                };

                if columns.is_empty() {
                    return Ok(None);
                }

                let width = columns.len();
                let mut stmt = conn.prepare(&select_sql)?;
                let rows = stmt
                    .query_map([], |row| {
                        (0..width)
                            .map(|i| row.get::<_, Value>(i))
                            .collect::<std::result::Result<Vec<_>, _>>()
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                Ok(Some((columns, rows)))
            })
            .await
            .map_err(|e| Error::SourceUnavailable(format!("failed to read {}: {}", table, e)))?;

        let (columns, rows) = scan.ok_or_else(|| {
            Error::SourceUnavailable(format!("table {} does not exist", table))
        })?;

        if let Some(expected) = pinned {
            for field in expected.fields() {
                if !columns.iter().any(|(name, _)| name == field.name()) {
                    return Err(Error::SchemaMismatch(format!(
                        "table {} is missing column {}",
                        table,
                        field.name()
                    )));
                }
            }
        }

        let mut fields = Vec::with_capacity(columns.len());
        let mut arrays = Vec::with_capacity(columns.len());
        for (idx, (name, declared)) in columns.iter().enumerate() {
            let data_type = pinned
                .and_then(|s| s.field_with_name(name).ok())
                .map(|f| f.data_type().clone())
                .unwrap_or_else(|| arrow_type_for_declared(declared));
            arrays.push(column_from_rows(&rows, idx, name, &data_type)?);
            fields.push(Field::new(name, data_type, true));
        }

        let schema = Arc::new(Schema::new(fields));
        let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
        let batch = RecordBatch::try_new_with_options(schema.clone(), arrays, &options)?;

        debug!(table = %table, rows = rows.len(), "Read source table");
        Ok(Dataset::new(table.table.clone(), schema, vec![batch]))
    }
}

pub struct SqliteSink {
    conn: tokio_rusqlite::Connection,
}

impl SqliteSink {
    /// Opens (or creates) the sink database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = tokio_rusqlite::Connection::open(path).await.map_err(|e| {
            Error::SinkUnavailable(format!(
                "cannot open sink database {}: {}",
                path.display(),
                e
            ))
        })?;
        info!(path = %path.display(), "Opened sink store");
        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| Error::SinkUnavailable(e.to_string()))?;
        Ok(Self { conn })
    }

    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(|e| Error::SinkUnavailable(e.to_string()))
    }
}

fn sink_error(table: &str, err: tokio_rusqlite::Error) -> Error {
    match err {
        tokio_rusqlite::Error::ConnectionClosed => {
            Error::SinkUnavailable(format!("connection closed while writing {}", table))
        }
        other => Error::SinkWriteRejected {
            table: table.to_string(),
            reason: other.to_string(),
        },
    }
}

impl SqliteSink {
    /// Writes `batches` into `table` in one transaction. With `replace` the
    /// table is dropped first, so it ends up holding exactly these rows.
    async fn write(
        &self,
        table: &str,
        schema: &Schema,
        batches: &[RecordBatch],
        replace: bool,
    ) -> Result<u64> {
        let mut column_defs = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            column_defs.push(format!(
                "{} {}",
                quote_ident(field.name()),
                declared_type_for_arrow(field.data_type())?
            ));
        }
        let column_names: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| quote_ident(f.name()))
            .collect();
        let placeholders: Vec<String> = (1..=column_names.len()).map(|i| format!("?{}", i)).collect();

        let drop_sql = replace.then(|| format!("DROP TABLE IF EXISTS {}", quote_ident(table)));
        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            column_defs.join(", ")
        );
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_names.join(", "),
            placeholders.join(", ")
        );

        let mut rows: Vec<Vec<Value>> = Vec::new();
        for batch in batches {
            for row_idx in 0..batch.num_rows() {
                let row = batch
                    .columns()
                    .iter()
                    .map(|column| sql_value_from_array(column.as_ref(), row_idx))
                    .collect::<Result<Vec<_>>>()?;
                rows.push(row);
            }
        }

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if let Some(drop_sql) = &drop_sql {
                    tx.execute_batch(drop_sql)?;
                }
                tx.execute_batch(&create_sql)?;
                {
                    let mut stmt = tx.prepare(&insert_sql)?;
                    for row in &rows {
                        stmt.execute(rusqlite::params_from_iter(row.iter()))?;
                    }
                }
                tx.commit()?;
                Ok(rows.len() as u64)
            })
            .await
            .map_err(|e| sink_error(table, e))
    }
}

#[async_trait]
impl SinkStore for SqliteSink {
    async fn append(&self, table: &str, batches: &[RecordBatch]) -> Result<u64> {
        let Some(first) = batches.first() else {
            return Ok(0);
        };

        let written = self.write(table, &first.schema(), batches, false).await?;
        debug!(table, rows = written, "Appended rows to sink");
        Ok(written)
    }

    async fn replace(&self, table: &str, schema: &Schema, batches: &[RecordBatch]) -> Result<u64> {
        let written = self.write(table, schema, batches, true).await?;
        debug!(table, rows = written, "Replaced sink table");
        Ok(written)
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let name = table.to_string();
        let count_sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));

        self.conn
            .call(move |conn| {
                let exists: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master \
                     WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                    rusqlite::params![name],
                    |r| r.get(0),
                )?;
                if exists == 0 {
                    return Ok(0);
                }
                let count: i64 = conn.query_row(&count_sql, [], |r| r.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(|e| Error::SinkUnavailable(e.to_string()))
    }
}
