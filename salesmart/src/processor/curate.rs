use crate::dataset::Dataset;
use crate::processor::normalize::{POS_SITE, SKU};
use common::Result;
use datafusion::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const CURATED_FACT: &str = "curated_fact_transactions";

/// Curated facts plus the row accounting of the semi-join.
#[derive(Debug, Clone)]
pub struct Curation {
    pub dataset: Dataset,
    pub counts: CurationCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurationCounts {
    pub input_rows: usize,
    pub kept_rows: usize,
    pub dropped_rows: usize,
}

/// Restricts the transaction facts to known sites and SKUs.
pub struct FactCurator {
    ctx: Arc<SessionContext>,
}

impl FactCurator {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// Left-semi join of `fact` on `pos_site_id` against the site dimension,
    /// then on `sku_id` against the SKU dimension. Kept rows are unchanged.
    pub async fn curate(&self, fact: &Dataset, sites: &Dataset, skus: &Dataset) -> Result<Curation> {
        let site_keys = sites
            .frame(&self.ctx)
            .await?
            .select(vec![col(POS_SITE.key).alias("__site_key")])?;
        let sku_keys = skus
            .frame(&self.ctx)
            .await?
            .select(vec![col(SKU.key).alias("__sku_key")])?;

        let curated = fact
            .frame(&self.ctx)
            .await?
            .join(site_keys, JoinType::LeftSemi, &["pos_site_id"], &["__site_key"], None)?
            .join(sku_keys, JoinType::LeftSemi, &["sku_id"], &["__sku_key"], None)?;

        let dataset = Dataset::from_frame(CURATED_FACT, curated).await?;

        let input_rows = fact.num_rows();
        let kept_rows = dataset.num_rows();
        let counts = CurationCounts {
            input_rows,
            kept_rows,
            dropped_rows: input_rows - kept_rows,
        };

        if counts.dropped_rows > 0 {
            warn!(
                input_rows,
                kept_rows,
                dropped_rows = counts.dropped_rows,
                "Dropped fact rows without a matching site or SKU"
            );
        } else {
            info!(input_rows, "All fact rows matched the dimensions");
        }

        Ok(Curation { dataset, counts })
    }
}
