use crate::catalog::{HIER_POSSITE, HIER_PROD};
use crate::dataset::Dataset;
use crate::utils::arrow::int64_column;
use arrow::array::{AsArray, BooleanArray};
use arrow::compute::filter_record_batch;
use arrow::datatypes::Int64Type;
use arrow::record_batch::RecordBatch;
use common::config::ConflictPolicy;
use common::{Error, Result};
use datafusion::functions_aggregate::expr_fn::count;
use datafusion::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Foreign key from a dimension to the key of its parent dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    pub dimension: &'static str,
    pub column: &'static str,
    /// Suffix of the referential check name, e.g. `cat_fk`.
    pub check_suffix: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionSpec {
    pub name: &'static str,
    /// Source hierarchy table the dimension is projected from.
    pub source: &'static str,
    pub key: &'static str,
    pub attributes: &'static [&'static str],
    pub parent: Option<ParentRef>,
}

impl DimensionSpec {
    /// Projected columns: key, owned attributes, then the parent key.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = vec![self.key];
        columns.extend_from_slice(self.attributes);
        if let Some(parent) = self.parent {
            columns.push(parent.column);
        }
        columns
    }

    pub fn dataset_name(&self) -> String {
        format!("dim_{}", self.name)
    }
}

pub const POS_SITE: DimensionSpec = DimensionSpec {
    name: "pos_site",
    source: HIER_POSSITE,
    key: "site_id",
    attributes: &[
        "site_label",
        "subchnl_id",
        "subchnl_label",
        "chnl_id",
        "chnl_label",
    ],
    parent: None,
};

pub const CATEGORY: DimensionSpec = DimensionSpec {
    name: "category",
    source: HIER_PROD,
    key: "cat_id",
    attributes: &["cat_label"],
    parent: None,
};

pub const SUBCATEGORY: DimensionSpec = DimensionSpec {
    name: "subcategory",
    source: HIER_PROD,
    key: "subcat_id",
    attributes: &["subcat_label"],
    parent: Some(ParentRef {
        dimension: "category",
        column: "cat_id",
        check_suffix: "cat_fk",
    }),
};

pub const STYLE: DimensionSpec = DimensionSpec {
    name: "style",
    source: HIER_PROD,
    key: "styl_id",
    attributes: &["styl_label"],
    parent: Some(ParentRef {
        dimension: "subcategory",
        column: "subcat_id",
        check_suffix: "subcat_fk",
    }),
};

pub const SKU: DimensionSpec = DimensionSpec {
    name: "sku",
    source: HIER_PROD,
    key: "sku_id",
    attributes: &[
        "sku_label",
        "stylclr_id",
        "stylclr_label",
        "issvc",
        "isasmbly",
        "isnfs",
    ],
    parent: Some(ParentRef {
        dimension: "style",
        column: "styl_id",
        check_suffix: "styl_fk",
    }),
};

/// Every dimension, parents before children.
pub const DIMENSIONS: [&DimensionSpec; 5] = [&POS_SITE, &CATEGORY, &SUBCATEGORY, &STYLE, &SKU];

#[derive(Debug, Clone)]
pub struct Dimension {
    spec: &'static DimensionSpec,
    dataset: Dataset,
    conflicting_keys: Vec<Option<i64>>,
}

impl Dimension {
    pub fn spec(&self) -> &'static DimensionSpec {
        self.spec
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Keys that had more than one distinct attribute tuple in the source.
    /// `None` stands for rows whose key is NULL.
    pub fn conflicting_keys(&self) -> &[Option<i64>] {
        &self.conflicting_keys
    }
}

#[derive(Debug, Clone)]
pub struct Dimensions {
    dimensions: Vec<Dimension>,
}

impl Dimensions {
    pub fn get(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.spec.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.iter()
    }

    pub fn pos_site(&self) -> Result<&Dimension> {
        self.require(POS_SITE.name)
    }

    pub fn sku(&self) -> Result<&Dimension> {
        self.require(SKU.name)
    }

    fn require(&self, name: &str) -> Result<&Dimension> {
        self.get(name)
            .ok_or_else(|| Error::Other(format!("Dimension {} was not normalized", name)))
    }
}

/// Splits the denormalized hierarchy tables into one table per level.
pub struct Normalizer {
    ctx: Arc<SessionContext>,
    on_conflict: ConflictPolicy,
}

impl Normalizer {
    pub fn new(ctx: Arc<SessionContext>, on_conflict: ConflictPolicy) -> Self {
        Self { ctx, on_conflict }
    }

    /// Distinct projection of `source` onto the columns of `spec`.
    ///
    /// A key with several distinct tuples is a conflict. Under `warn` the
    /// first tuple seen in load order is kept; under `fail` the projection
    /// errors with `ConflictingDimensionRow`.
    pub async fn project(&self, source: &Dataset, spec: &'static DimensionSpec) -> Result<Dimension> {
        let source_schema = source.schema();
        let indices = spec
            .columns()
            .iter()
            .map(|c| source_schema.index_of(c))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let projected = source
            .batches()
            .iter()
            .map(|b| b.project(&indices))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let projected_schema = Arc::new(source_schema.project(&indices)?);

        let conflicting_keys = self
            .conflicting_keys(
                Dataset::new(
                    format!("{}_candidates", spec.dataset_name()),
                    projected_schema.clone(),
                    projected.clone(),
                ),
                spec.key,
            )
            .await?;

        if !conflicting_keys.is_empty() {
            match self.on_conflict {
                ConflictPolicy::Fail => {
                    return Err(Error::ConflictingDimensionRow {
                        dimension: spec.name.to_string(),
                        keys: conflicting_keys,
                    });
                }
                ConflictPolicy::Warn => {
                    warn!(
                        dimension = spec.name,
                        conflicts = conflicting_keys.len(),
                        keys = ?conflicting_keys,
                        "Conflicting dimension rows, keeping first seen"
                    );
                }
            }
        }

        let batches = first_seen_per_key(&projected)?;
        let dataset = Dataset::new(spec.dataset_name(), projected_schema, batches);

        info!(
            dimension = spec.name,
            source = source.name(),
            rows = dataset.num_rows(),
            "Normalized dimension"
        );

        Ok(Dimension {
            spec,
            dataset,
            conflicting_keys,
        })
    }

    /// Builds all five dimensions from the product and site hierarchies.
    pub async fn normalize(&self, prod: &Dataset, site: &Dataset) -> Result<Dimensions> {
        let mut dimensions = Vec::with_capacity(DIMENSIONS.len());

        for spec in DIMENSIONS {
            let source = if spec.source == HIER_POSSITE { site } else { prod };
            dimensions.push(self.project(source, spec).await?);
        }

        Ok(Dimensions { dimensions })
    }

    /// NULL keys form one group, so differing rows without a key conflict too.
    async fn conflicting_keys(&self, candidates: Dataset, key: &str) -> Result<Vec<Option<i64>>> {
        let batches = candidates
            .frame(&self.ctx)
            .await?
            .distinct()?
            .aggregate(vec![col(key)], vec![count(lit(1)).alias("__tuples")])?
            .filter(col("__tuples").gt(lit(1_i64)))?
            .select(vec![col(key)])?
            .sort(vec![col(key).sort(true, false)])?
            .collect()
            .await?;

        int64_column(&batches, key)
    }
}

/// Keeps the first row of each key (column 0), in batch order.
fn first_seen_per_key(batches: &[RecordBatch]) -> Result<Vec<RecordBatch>> {
    let mut seen: HashSet<Option<i64>> = HashSet::new();
    let mut kept = Vec::with_capacity(batches.len());

    for batch in batches {
        let keys = batch.column(0).as_primitive_opt::<Int64Type>().ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "Dimension key {} must be Int64, found {:?}",
                batch.schema().field(0).name(),
                batch.column(0).data_type()
            ))
        })?;
        let mask: BooleanArray = keys.iter().map(|key| Some(seen.insert(key))).collect();
        kept.push(filter_record_batch(batch, &mask)?);
    }

    Ok(kept)
}
