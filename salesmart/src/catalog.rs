use common::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

pub const FACT_TRANSACTIONS: &str = "fact_transactions";
pub const HIER_PROD: &str = "hier_prod";
pub const HIER_POSSITE: &str = "hier_possite";

/// Tables the pipeline stages actually consume.
const REQUIRED_TABLES: [&str; 3] = [FACT_TRANSACTIONS, HIER_PROD, HIER_POSSITE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    Fact,
    Hierarchy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub table: &'static str,
    pub role: TableRole,
}

impl CatalogEntry {
    const fn new(table: &'static str, role: TableRole) -> Self {
        Self { table, role }
    }

    /// Name the loaded dataset is registered under, e.g. `stg_hier_prod`.
    pub fn view_name(&self) -> String {
        view_name(self.table)
    }
}

pub fn view_name(table: &str) -> String {
    format!("stg_{}", table)
}

const STANDARD_TABLES: [CatalogEntry; 10] = [
    CatalogEntry::new(FACT_TRANSACTIONS, TableRole::Fact),
    CatalogEntry::new("fact_averagecosts", TableRole::Hierarchy),
    CatalogEntry::new("hier_clnd", TableRole::Hierarchy),
    CatalogEntry::new("hier_hldy", TableRole::Hierarchy),
    CatalogEntry::new("hier_invloc", TableRole::Hierarchy),
    CatalogEntry::new("hier_invstatus", TableRole::Hierarchy),
    CatalogEntry::new(HIER_POSSITE, TableRole::Hierarchy),
    CatalogEntry::new("hier_pricestate", TableRole::Hierarchy),
    CatalogEntry::new(HIER_PROD, TableRole::Hierarchy),
    CatalogEntry::new("hier_rtlloc", TableRole::Hierarchy),
];

/// A table in the source store, addressed by schema and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone)]
pub struct TableCatalog {
    schema: String,
    entries: Vec<CatalogEntry>,
}

impl TableCatalog {
    /// The ten staging tables of the point-of-sale source, in load order.
    pub fn standard(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            entries: STANDARD_TABLES.to_vec(),
        }
    }

    pub fn with_entries(schema: impl Into<String>, entries: Vec<CatalogEntry>) -> Self {
        Self {
            schema: schema.into(),
            entries,
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn table_ref(&self, entry: &CatalogEntry) -> TableRef {
        TableRef::new(&self.schema, entry.table)
    }

    pub fn fact_table(&self) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.role == TableRole::Fact)
    }

    /// Startup check; a broken catalog is a configuration error.
    pub fn validate(&self) -> Result<()> {
        if self.schema.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Table catalog has an empty source schema".to_string(),
            ));
        }

        let fact_count = self
            .entries
            .iter()
            .filter(|e| e.role == TableRole::Fact)
            .count();
        if fact_count != 1 {
            return Err(Error::InvalidInput(format!(
                "Table catalog must declare exactly one fact table, found {}",
                fact_count
            )));
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.table.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "Table catalog contains an entry with an empty name".to_string(),
                ));
            }
            if !seen.insert(entry.table) {
                return Err(Error::InvalidInput(format!(
                    "Table catalog lists '{}' more than once",
                    entry.table
                )));
            }
        }

        for required in REQUIRED_TABLES {
            if !seen.contains(required) {
                return Err(Error::InvalidInput(format!(
                    "Table catalog is missing required table '{}'",
                    required
                )));
            }
        }

        Ok(())
    }
}
