use crate::catalog::{FACT_TRANSACTIONS, HIER_POSSITE, HIER_PROD};
use arrow::datatypes::{DataType, Field, Schema};
use common::{Error, Result};
use lazy_static::lazy_static;

// Source schemas. Only the columns the pipeline reads are pinned; any other
// column a source table carries is typed from its declared SQL type.
pub fn fact_transactions_schema() -> Schema {
    Schema::new(vec![
        Field::new("order_id", DataType::Int64, true),
        Field::new("line_id", DataType::Int64, true),
        Field::new("type", DataType::Utf8, true),
        Field::new("fscldt_id", DataType::Date32, true),
        Field::new("pos_site_id", DataType::Int64, true),
        Field::new("sku_id", DataType::Int64, true),
        Field::new("price_substate_id", DataType::Int64, true),
        Field::new("sales_units", DataType::Float64, true),
        Field::new("sales_dollars", DataType::Float64, true),
        Field::new("discount_dollars", DataType::Float64, true),
    ])
}

pub fn hier_prod_schema() -> Schema {
    Schema::new(vec![
        Field::new("sku_id", DataType::Int64, true),
        Field::new("sku_label", DataType::Utf8, true),
        Field::new("stylclr_id", DataType::Int64, true),
        Field::new("stylclr_label", DataType::Utf8, true),
        Field::new("styl_id", DataType::Int64, true),
        Field::new("styl_label", DataType::Utf8, true),
        Field::new("subcat_id", DataType::Int64, true),
        Field::new("subcat_label", DataType::Utf8, true),
        Field::new("cat_id", DataType::Int64, true),
        Field::new("cat_label", DataType::Utf8, true),
        Field::new("issvc", DataType::Boolean, true),
        Field::new("isasmbly", DataType::Boolean, true),
        Field::new("isnfs", DataType::Boolean, true),
    ])
}

pub fn hier_possite_schema() -> Schema {
    Schema::new(vec![
        Field::new("site_id", DataType::Int64, true),
        Field::new("site_label", DataType::Utf8, true),
        Field::new("subchnl_id", DataType::Int64, true),
        Field::new("subchnl_label", DataType::Utf8, true),
        Field::new("chnl_id", DataType::Int64, true),
        Field::new("chnl_label", DataType::Utf8, true),
    ])
}

// Sink schema of the weekly sales mart
pub fn weekly_sales_schema() -> Schema {
    Schema::new(vec![
        Field::new("pos_site_id", DataType::Int64, true),
        Field::new("sku_id", DataType::Int64, true),
        Field::new("fsclwk_id", DataType::Int64, true),
        Field::new("price_substate_id", DataType::Int64, true),
        Field::new("type", DataType::Utf8, true),
        Field::new("total_sales_units", DataType::Float64, true),
        Field::new("total_sales_dollars", DataType::Float64, true),
        Field::new("total_discount_dollars", DataType::Float64, true),
    ])
}

/// Expected schema for a source table, if the pipeline pins one.
pub fn get_source_schema(table: &str) -> Option<&'static Schema> {
    match table {
        FACT_TRANSACTIONS => Some(&FACT_TRANSACTIONS_SCHEMA),
        HIER_PROD => Some(&HIER_PROD_SCHEMA),
        HIER_POSSITE => Some(&HIER_POSSITE_SCHEMA),
        _ => None,
    }
}

pub fn get_weekly_sales_schema() -> &'static Schema {
    &WEEKLY_SALES_SCHEMA
}

/// Checks field names and types of `actual` against `expected`, in order.
/// Nullability is not compared and Utf8/Utf8View are treated as equal.
pub fn validate_schema(actual: &Schema, expected: &Schema) -> Result<()> {
    if actual.fields().len() != expected.fields().len() {
        return Err(Error::SchemaMismatch(format!(
            "Expected {} fields, found {}",
            expected.fields().len(),
            actual.fields().len()
        )));
    }

    for (expected_field, actual_field) in expected.fields().iter().zip(actual.fields().iter()) {
        if expected_field.name() != actual_field.name() {
            return Err(Error::SchemaMismatch(format!(
                "Field name mismatch. Expected: {}, Found: {}",
                expected_field.name(),
                actual_field.name()
            )));
        }

        let types_match = match (expected_field.data_type(), actual_field.data_type()) {
            (DataType::Utf8, DataType::Utf8View) => true,
            (DataType::Utf8View, DataType::Utf8) => true,
            (expected, actual) => expected == actual,
        };

        if !types_match {
            return Err(Error::SchemaMismatch(format!(
                "Type mismatch for field {}. Expected: {:?}, Found: {:?}",
                expected_field.name(),
                expected_field.data_type(),
                actual_field.data_type()
            )));
        }
    }

    Ok(())
}

// Lazy-loaded static schemas
lazy_static! {
    static ref FACT_TRANSACTIONS_SCHEMA: Schema = fact_transactions_schema();
    static ref HIER_PROD_SCHEMA: Schema = hier_prod_schema();
    static ref HIER_POSSITE_SCHEMA: Schema = hier_possite_schema();
    static ref WEEKLY_SALES_SCHEMA: Schema = weekly_sales_schema();
}
