use crate::catalog::FACT_TRANSACTIONS;
use crate::dataset::Dataset;
use crate::processor::normalize::{Dimensions, DIMENSIONS};
use crate::utils::arrow::scalar_i64;
use common::config::{ValidationConfig, ValidationMode};
use common::{Error, Result};
use datafusion::functions_aggregate::expr_fn::count;
use datafusion::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of a single quality check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { detail: String, offending: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub check: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl CheckResult {
    fn pass(check: &str) -> Self {
        Self {
            check: check.to_string(),
            verdict: Verdict::Pass,
        }
    }

    fn fail(check: &str, detail: String, offending: u64) -> Self {
        Self {
            check: check.to_string(),
            verdict: Verdict::Fail { detail, offending },
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// Not-null, uniqueness and referential checks over datasets.
///
/// A failing check is a `Fail` verdict, never an `Err`; errors are reserved
/// for the query engine itself (e.g. a column that does not exist).
pub struct DataValidator {
    ctx: Arc<SessionContext>,
}

impl DataValidator {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// Fails if `count(*) != count(column)` for any of `columns`.
    pub async fn not_null(
        &self,
        check: &str,
        dataset: &Dataset,
        columns: &[&str],
    ) -> Result<CheckResult> {
        let df = dataset.frame(&self.ctx).await?;

        let mut aggregates = vec![count(lit(1)).alias("__total")];
        for (idx, column) in columns.iter().enumerate() {
            aggregates.push(count(col(*column)).alias(format!("__non_null_{}", idx)));
        }
        let batches = df.aggregate(vec![], aggregates)?.collect().await?;

        let total = scalar_i64(&batches, "__total")?;
        let mut nulls = Vec::new();
        let mut offending = 0u64;
        for (idx, column) in columns.iter().enumerate() {
            let non_null = scalar_i64(&batches, &format!("__non_null_{}", idx))?;
            if non_null != total {
                let missing = (total - non_null) as u64;
                offending += missing;
                nulls.push(format!("{} ({})", column, missing));
            }
        }

        if nulls.is_empty() {
            Ok(CheckResult::pass(check))
        } else {
            Ok(CheckResult::fail(
                check,
                format!("{}: null values in {}", dataset.name(), nulls.join(", ")),
                offending,
            ))
        }
    }

    /// Fails if any group of `keys` holds more than one row.
    pub async fn unique(&self, check: &str, dataset: &Dataset, keys: &[&str]) -> Result<CheckResult> {
        let group_by: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();

        let duplicated_groups = dataset
            .frame(&self.ctx)
            .await?
            .aggregate(group_by, vec![count(lit(1)).alias("__rows")])?
            .filter(col("__rows").gt(lit(1_i64)))?
            .count()
            .await?;

        if duplicated_groups == 0 {
            Ok(CheckResult::pass(check))
        } else {
            Ok(CheckResult::fail(
                check,
                format!(
                    "{}: {} duplicated key groups on ({})",
                    dataset.name(),
                    duplicated_groups,
                    keys.join(", ")
                ),
                duplicated_groups as u64,
            ))
        }
    }

    /// Fails if any `child` row has no `parent` row with a matching key.
    /// Null child keys never match and count as orphans.
    pub async fn referential(
        &self,
        check: &str,
        child: &Dataset,
        child_key: &str,
        parent: &Dataset,
        parent_key: &str,
    ) -> Result<CheckResult> {
        let child_df = child.frame(&self.ctx).await?.select(vec![col(child_key)])?;
        let parent_df = parent
            .frame(&self.ctx)
            .await?
            .select(vec![col(parent_key).alias("__parent_key")])?;

        let orphans = child_df
            .join(parent_df, JoinType::LeftAnti, &[child_key], &["__parent_key"], None)?
            .count()
            .await?;

        if orphans == 0 {
            Ok(CheckResult::pass(check))
        } else {
            Ok(CheckResult::fail(
                check,
                format!(
                    "{} rows of {} have {} not present in {}.{}",
                    orphans,
                    child.name(),
                    child_key,
                    parent.name(),
                    parent_key
                ),
                orphans as u64,
            ))
        }
    }

    /// Quality battery over the raw transaction facts.
    pub async fn validate_facts(
        &self,
        fact: &Dataset,
        prod: &Dataset,
        site: &Dataset,
    ) -> Result<Vec<CheckResult>> {
        Ok(vec![
            self.not_null(
                &format!("{}.not_null", FACT_TRANSACTIONS),
                fact,
                &["order_id", "line_id", "sku_id", "fscldt_id"],
            )
            .await?,
            self.unique(
                &format!("{}.pk_unique", FACT_TRANSACTIONS),
                fact,
                &["order_id", "line_id"],
            )
            .await?,
            self.referential(
                &format!("{}.sku_fk", FACT_TRANSACTIONS),
                fact,
                "sku_id",
                prod,
                "sku_id",
            )
            .await?,
            self.referential(
                &format!("{}.pos_site_fk", FACT_TRANSACTIONS),
                fact,
                "pos_site_id",
                site,
                "site_id",
            )
            .await?,
        ])
    }

    /// Key presence and uniqueness of every dimension, then parent resolution
    /// of every dimension that has a parent level.
    pub async fn validate_hierarchy(&self, dimensions: &Dimensions) -> Result<Vec<CheckResult>> {
        let mut results = Vec::new();

        for dimension in dimensions.iter() {
            let spec = dimension.spec();
            results.push(
                self.not_null(
                    &format!("{}.key_not_null", spec.name),
                    dimension.dataset(),
                    &[spec.key],
                )
                .await?,
            );
            results.push(
                self.unique(
                    &format!("{}.key_unique", spec.name),
                    dimension.dataset(),
                    &[spec.key],
                )
                .await?,
            );
        }

        for dimension in dimensions.iter() {
            let spec = dimension.spec();
            let Some(parent) = spec.parent else {
                continue;
            };
            let parent_dim = dimensions.get(parent.dimension).ok_or_else(|| {
                Error::Other(format!(
                    "Dimension {} references unknown parent {}",
                    spec.name, parent.dimension
                ))
            })?;
            results.push(
                self.referential(
                    &format!("{}.{}", spec.name, parent.check_suffix),
                    dimension.dataset(),
                    parent.column,
                    parent_dim.dataset(),
                    parent_dim.spec().key,
                )
                .await?,
            );
        }

        Ok(results)
    }
}

/// Names of every check the fact and hierarchy batteries can report.
pub fn known_checks() -> Vec<String> {
    let mut checks: Vec<String> = ["not_null", "pk_unique", "sku_fk", "pos_site_fk"]
        .iter()
        .map(|suffix| format!("{}.{}", FACT_TRANSACTIONS, suffix))
        .collect();

    for spec in DIMENSIONS {
        checks.push(format!("{}.key_not_null", spec.name));
        checks.push(format!("{}.key_unique", spec.name));
    }
    for spec in DIMENSIONS {
        if let Some(parent) = spec.parent {
            checks.push(format!("{}.{}", spec.name, parent.check_suffix));
        }
    }

    checks
}

/// Decides which failing checks halt the run.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    mode: ValidationMode,
    blocking_checks: HashSet<String>,
}

impl ValidationPolicy {
    pub fn new(mode: ValidationMode, blocking_checks: impl IntoIterator<Item = String>) -> Self {
        Self {
            mode,
            blocking_checks: blocking_checks.into_iter().collect(),
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(config.mode, config.blocking_checks.iter().cloned())
    }

    /// Entries of `blocking_checks` that no battery reports, sorted.
    pub fn unknown_checks(&self) -> Vec<String> {
        let known = known_checks();
        let mut unknown: Vec<String> = self
            .blocking_checks
            .iter()
            .filter(|check| !known.contains(check))
            .cloned()
            .collect();
        unknown.sort();
        unknown
    }

    pub fn is_blocking(&self, check: &str) -> bool {
        self.mode == ValidationMode::Blocking || self.blocking_checks.contains(check)
    }

    /// Logs every verdict and returns `ValidationFailed` if any blocking
    /// check failed.
    pub fn enforce(&self, stage: &str, results: &[CheckResult]) -> Result<()> {
        let mut blocking_failures = Vec::new();

        for result in results {
            match &result.verdict {
                Verdict::Pass => info!(stage, check = %result.check, "Check passed"),
                Verdict::Fail { detail, offending } => {
                    if self.is_blocking(&result.check) {
                        error!(stage, check = %result.check, offending, %detail, "Blocking check failed");
                        blocking_failures.push(result.clone());
                    } else {
                        warn!(stage, check = %result.check, offending, %detail, "Advisory check failed");
                    }
                }
            }
        }

        if blocking_failures.is_empty() {
            return Ok(());
        }

        Err(Error::ValidationFailed {
            stage: stage.to_string(),
            checks: blocking_failures.iter().map(|r| r.check.clone()).collect(),
            detail: serde_json::to_string(&blocking_failures)?,
        })
    }
}
