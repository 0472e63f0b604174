//! Shared test data.

use crate::dataset::Dataset;
use crate::schema::{
    fact_transactions_schema, hier_possite_schema, hier_prod_schema, weekly_sales_schema,
};
use arrow::array::{ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{Date32Type, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use common::config::{
    AggregationConfig, NormalizationConfig, RunConfig, Settings, SinkConfig, SourceConfig,
    ValidationConfig,
};
use std::sync::Arc;

/// Every catalog table, with `fact_transactions` carrying an extra column and
/// storing dates as text.
pub const SOURCE_DDL: &str = "
    CREATE TABLE fact_transactions (
        order_id INTEGER, line_id INTEGER, type TEXT, fscldt_id TEXT,
        pos_site_id INTEGER, sku_id INTEGER, price_substate_id INTEGER,
        sales_units INTEGER, sales_dollars REAL, discount_dollars REAL, channel TEXT
    );
    CREATE TABLE fact_averagecosts (fscldt_id TEXT, sku_id INTEGER, average_unit_standardcost REAL);
    CREATE TABLE hier_clnd (fscldt_id TEXT, fscldt_label TEXT, fsclwk_id INTEGER, fsclwk_label TEXT);
    CREATE TABLE hier_hldy (hldy_id TEXT, hldy_label TEXT);
    CREATE TABLE hier_invloc (loc TEXT, loc_label TEXT, loctype TEXT);
    CREATE TABLE hier_invstatus (code TEXT, code_label TEXT, bckt TEXT);
    CREATE TABLE hier_possite (
        site_id INTEGER, site_label TEXT, subchnl_id INTEGER, subchnl_label TEXT,
        chnl_id INTEGER, chnl_label TEXT
    );
    CREATE TABLE hier_pricestate (substate_id INTEGER, substate_label TEXT, state_id INTEGER);
    CREATE TABLE hier_prod (
        sku_id INTEGER, sku_label TEXT, stylclr_id INTEGER, stylclr_label TEXT,
        styl_id INTEGER, styl_label TEXT, subcat_id INTEGER, subcat_label TEXT,
        cat_id INTEGER, cat_label TEXT, issvc BOOLEAN, isasmbly BOOLEAN, isnfs BOOLEAN
    );
    CREATE TABLE hier_rtlloc (str TEXT, str_label TEXT, dstr TEXT, rgn TEXT);
";

pub fn settings() -> Settings {
    Settings {
        source: SourceConfig {
            endpoint: ":memory:".to_string(),
            schema: "main".to_string(),
            user: None,
            password: None,
        },
        sink: SinkConfig {
            endpoint: ":memory:".to_string(),
            table: "mview_weekly_sales".to_string(),
            staging: true,
            staging_prefix: "staging_".to_string(),
            user: None,
            password: None,
        },
        validation: ValidationConfig::default(),
        normalization: NormalizationConfig::default(),
        aggregation: AggregationConfig::default(),
        run: RunConfig::default(),
    }
}

fn date(text: &str) -> i32 {
    Date32Type::from_naive_date(NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap())
}

fn batch(schema: Schema, columns: Vec<ArrayRef>) -> RecordBatch {
    RecordBatch::try_new(Arc::new(schema), columns).unwrap()
}

/// One transaction line. Defaults to a SALE of one unit for 10.00 at
/// price substate 7 without discount.
#[derive(Debug, Clone)]
pub struct FactRow {
    pub order_id: Option<i64>,
    pub line_id: Option<i64>,
    pub kind: Option<&'static str>,
    pub fscldt_id: Option<&'static str>,
    pub pos_site_id: Option<i64>,
    pub sku_id: Option<i64>,
    pub price_substate_id: Option<i64>,
    pub sales_units: Option<f64>,
    pub sales_dollars: Option<f64>,
    pub discount_dollars: Option<f64>,
}

impl FactRow {
    pub fn new(order_id: i64, line_id: i64, sku_id: i64, pos_site_id: i64, day: &'static str) -> Self {
        Self {
            order_id: Some(order_id),
            line_id: Some(line_id),
            kind: Some("SALE"),
            fscldt_id: Some(day),
            pos_site_id: Some(pos_site_id),
            sku_id: Some(sku_id),
            price_substate_id: Some(7),
            sales_units: Some(1.0),
            sales_dollars: Some(10.0),
            discount_dollars: Some(0.0),
        }
    }

    pub fn measures(mut self, units: Option<f64>, dollars: Option<f64>, discount: Option<f64>) -> Self {
        self.sales_units = units;
        self.sales_dollars = dollars;
        self.discount_dollars = discount;
        self
    }
}

pub fn fact_dataset(rows: &[FactRow]) -> Dataset {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.order_id))),
        Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.line_id))),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.kind))),
        Arc::new(Date32Array::from_iter(rows.iter().map(|r| r.fscldt_id.map(date)))),
        Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.pos_site_id))),
        Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.sku_id))),
        Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.price_substate_id))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.sales_units))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.sales_dollars))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.discount_dollars))),
    ];
    let batch = batch(fact_transactions_schema(), columns);
    Dataset::new("fact", batch.schema(), vec![batch])
}

/// One `hier_prod` row; labels are derived from the identifiers.
#[derive(Debug, Clone)]
pub struct ProdRow {
    pub sku_id: Option<i64>,
    pub sku_label: String,
    pub styl_id: i64,
    pub styl_label: String,
    pub subcat_id: i64,
    pub subcat_label: String,
    pub cat_id: i64,
    pub cat_label: String,
}

impl ProdRow {
    pub fn new(sku_id: i64, styl_id: i64, subcat_id: i64, cat_id: i64) -> Self {
        Self {
            sku_id: Some(sku_id),
            sku_label: format!("sku {}", sku_id),
            styl_id,
            styl_label: format!("style {}", styl_id),
            subcat_id,
            subcat_label: format!("subcategory {}", subcat_id),
            cat_id,
            cat_label: format!("category {}", cat_id),
        }
    }
}

pub fn prod_dataset(rows: &[ProdRow]) -> Dataset {
    let flags = || Arc::new(BooleanArray::from(vec![false; rows.len()])) as ArrayRef;
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.sku_id))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.sku_label.as_str()))),
        Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.sku_id.map(|id| id * 10)))),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| format!("{} colorway", r.sku_label)),
        )),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.styl_id))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.styl_label.as_str()))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.subcat_id))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.subcat_label.as_str()))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.cat_id))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.cat_label.as_str()))),
        flags(),
        flags(),
        flags(),
    ];
    let batch = batch(hier_prod_schema(), columns);
    Dataset::new("prod", batch.schema(), vec![batch])
}

/// `hier_possite` rows, all in the same sub-channel and channel.
pub fn site_dataset(sites: &[(i64, &str)]) -> Dataset {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(sites.iter().map(|(id, _)| *id))),
        Arc::new(StringArray::from_iter_values(sites.iter().map(|(_, label)| *label))),
        Arc::new(Int64Array::from(vec![10; sites.len()])),
        Arc::new(StringArray::from(vec!["Mall"; sites.len()])),
        Arc::new(Int64Array::from(vec![100; sites.len()])),
        Arc::new(StringArray::from(vec!["Retail"; sites.len()])),
    ];
    let batch = batch(hier_possite_schema(), columns);
    Dataset::new("site", batch.schema(), vec![batch])
}

/// A batch in the sink schema from
/// `(site, sku, week, price_substate, type, units, dollars, discount)` tuples.
#[allow(clippy::type_complexity)]
pub fn weekly_sales_batch(rows: &[(i64, i64, i64, i64, &str, f64, f64, f64)]) -> RecordBatch {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.2))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.3))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.4))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.5))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.6))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.7))),
    ];
    batch(weekly_sales_schema(), columns)
}
