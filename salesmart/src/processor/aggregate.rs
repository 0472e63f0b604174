use crate::dataset::Dataset;
use crate::processor::udf::FISCAL_WEEK;
use crate::schema::{get_weekly_sales_schema, validate_schema};
use arrow::datatypes::DataType;
use common::Result;
use datafusion::execution::FunctionRegistry;
use datafusion::functions_aggregate::expr_fn::sum;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::info;

pub const WEEKLY_SALES: &str = "weekly_sales";

/// Grouping key of the weekly sales mart, also its sort order.
pub const GROUP_KEY: [&str; 5] = ["pos_site_id", "sku_id", "fsclwk_id", "price_substate_id", "type"];

const MEASURES: [(&str, &str); 3] = [
    ("sales_units", "total_sales_units"),
    ("sales_dollars", "total_sales_dollars"),
    ("discount_dollars", "total_discount_dollars"),
];

pub struct Aggregator {
    ctx: Arc<SessionContext>,
}

impl Aggregator {
    /// `ctx` must have the `fiscal_week` UDF registered.
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// Weekly sums of the curated facts in the sink schema, sorted by the
    /// grouping key.
    pub async fn aggregate(&self, curated: &Dataset) -> Result<Dataset> {
        let fiscal_week = self.ctx.udf(FISCAL_WEEK)?;

        let group_by: Vec<Expr> = GROUP_KEY.iter().map(|c| col(*c)).collect();
        let sums: Vec<Expr> = MEASURES
            .iter()
            .map(|(measure, total)| sum(cast(col(*measure), DataType::Float64)).alias(*total))
            .collect();

        let sink_schema = get_weekly_sales_schema();
        let projection: Vec<Expr> = sink_schema
            .fields()
            .iter()
            .map(|f| try_cast(col(f.name()), f.data_type().clone()).alias(f.name()))
            .collect();

        let df = curated
            .frame(&self.ctx)
            .await?
            .with_column("fsclwk_id", fiscal_week.call(vec![col("fscldt_id")]))?
            .aggregate(group_by, sums)?
            .select(projection)?
            .sort(GROUP_KEY.iter().map(|c| col(*c).sort(true, true)).collect())?;

        let dataset = Dataset::from_frame(WEEKLY_SALES, df).await?;
        validate_schema(&dataset.schema(), sink_schema)?;

        info!(
            input_rows = curated.num_rows(),
            groups = dataset.num_rows(),
            "Aggregated weekly sales"
        );
        Ok(dataset)
    }
}
