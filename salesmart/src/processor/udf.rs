use chrono::{Datelike, NaiveDate};
use common::Result;
use common::config::WeekConvention;
use datafusion::arrow::array::{Date32Array, Int64Array};
use datafusion::arrow::datatypes::{DataType, Date32Type};
use datafusion::common::DataFusionError;
use datafusion::execution::context::SessionContext;
use datafusion::logical_expr::ColumnarValue;
use datafusion::logical_expr::{ScalarUDF, Volatility, create_udf};
use std::sync::Arc;

pub const FISCAL_WEEK: &str = "fiscal_week";

/// Registers all UDFs with the SessionContext
pub fn register_udfs(ctx: &SessionContext, convention: WeekConvention) -> Result<()> {
    ctx.register_udf(fiscal_week_udf(convention));
    Ok(())
}

/// `fiscal_week(date) -> BIGINT` under the configured week convention.
pub fn fiscal_week_udf(convention: WeekConvention) -> ScalarUDF {
    create_udf(
        FISCAL_WEEK,
        vec![DataType::Date32],
        DataType::Int64,
        Volatility::Immutable,
        Arc::new(move |args: &[ColumnarValue]| {
            fiscal_week(args, convention).map_err(|e| DataFusionError::Internal(e.to_string()))
        }),
    )
}

fn fiscal_week(args: &[ColumnarValue], convention: WeekConvention) -> Result<ColumnarValue> {
    let arrays = ColumnarValue::values_to_arrays(args)?;
    let dates = arrays
        .first()
        .and_then(|a| a.as_any().downcast_ref::<Date32Array>())
        .ok_or_else(|| DataFusionError::Internal("Expected date32 array".to_string()))?;

    let result: Int64Array = dates
        .iter()
        .map(|opt_days| opt_days.map(|days| week_of(Date32Type::to_naive_date(days), convention)))
        .collect();

    Ok(ColumnarValue::Array(Arc::new(result)))
}

/// Week number of `date` under `convention`.
pub fn week_of(date: NaiveDate, convention: WeekConvention) -> i64 {
    match convention {
        WeekConvention::IsoWeek => date.iso_week().week() as i64,
        WeekConvention::IsoYearWeek => {
            let iso = date.iso_week();
            iso.year() as i64 * 100 + iso.week() as i64
        }
        WeekConvention::SundayWeek => {
            let jan_first_offset = NaiveDate::from_yo_opt(date.year(), 1)
                .map(|jan1| jan1.weekday().num_days_from_sunday())
                .unwrap_or(0);
            ((date.ordinal0() + jan_first_offset) / 7 + 1) as i64
        }
    }
}
