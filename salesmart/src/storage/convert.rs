//! Conversions between SQLite values and Arrow columns.

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanBuilder, Date32Builder, Float64Builder, Int64Builder,
    StringBuilder,
};
use arrow::datatypes::{
    DataType, Date32Type, Float32Type, Float64Type, Int32Type, Int64Type,
};
use chrono::NaiveDate;
use common::{Error, Result};
use rusqlite::types::Value;
use std::sync::Arc;

/// Maps a declared SQLite column type to an Arrow type, following SQLite's
/// own affinity rules loosely.
pub fn arrow_type_for_declared(declared: &str) -> DataType {
    let declared = declared.to_ascii_uppercase();

    if declared.contains("BOOL") || declared == "BIT" {
        DataType::Boolean
    } else if declared.contains("DATE") && !declared.contains("TIME") {
        DataType::Date32
    } else if declared.contains("INT") {
        DataType::Int64
    } else if ["REAL", "FLOA", "DOUB", "DEC", "NUM"]
        .iter()
        .any(|t| declared.contains(t))
    {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

/// SQLite column type used when creating sink tables.
pub fn declared_type_for_arrow(data_type: &DataType) -> Result<&'static str> {
    match data_type {
        DataType::Int32 | DataType::Int64 => Ok("BIGINT"),
        DataType::Float32 | DataType::Float64 => Ok("DOUBLE"),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Ok("TEXT"),
        DataType::Boolean => Ok("BOOLEAN"),
        DataType::Date32 => Ok("DATE"),
        other => Err(Error::SchemaMismatch(format!(
            "No SQLite column type for Arrow type {:?}",
            other
        ))),
    }
}

/// Builds one Arrow column of `data_type` from the `index`-th value of each row.
pub fn column_from_rows(
    rows: &[Vec<Value>],
    index: usize,
    column: &str,
    data_type: &DataType,
) -> Result<ArrayRef> {
    let values = rows.iter().map(|row| &row[index]);

    let array: ArrayRef = match data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for value in values {
                builder.append_option(to_i64(value, column)?);
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for value in values {
                builder.append_option(to_f64(value, column)?);
            }
            Arc::new(builder.finish())
        }
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(rows.len());
            for value in values {
                builder.append_option(to_bool(value, column)?);
            }
            Arc::new(builder.finish())
        }
        DataType::Date32 => {
            let mut builder = Date32Builder::with_capacity(rows.len());
            for value in values {
                builder.append_option(to_date32(value, column)?);
            }
            Arc::new(builder.finish())
        }
        DataType::Utf8 => {
            let mut builder = StringBuilder::new();
            for value in values {
                builder.append_option(to_text(value));
            }
            Arc::new(builder.finish())
        }
        other => {
            return Err(Error::SchemaMismatch(format!(
                "Unsupported column type {:?} for {}",
                other, column
            )));
        }
    };

    Ok(array)
}

fn mismatch(column: &str, value: &Value, expected: &str) -> Error {
    Error::SchemaMismatch(format!(
        "Column {}: cannot read {:?} as {}",
        column, value, expected
    ))
}

fn to_i64(value: &Value, column: &str) -> Result<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(*i)),
        Value::Real(f) if f.fract() == 0.0 => Ok(Some(*f as i64)),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| mismatch(column, value, "integer")),
        _ => Err(mismatch(column, value, "integer")),
    }
}

fn to_f64(value: &Value, column: &str) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(*i as f64)),
        Value::Real(f) => Ok(Some(*f)),
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| mismatch(column, value, "number")),
        _ => Err(mismatch(column, value, "number")),
    }
}

fn to_bool(value: &Value, column: &str) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(0) => Ok(Some(false)),
        Value::Integer(1) => Ok(Some(true)),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "y" | "yes" => Ok(Some(true)),
            "0" | "false" | "f" | "n" | "no" => Ok(Some(false)),
            _ => Err(mismatch(column, value, "boolean")),
        },
        _ => Err(mismatch(column, value, "boolean")),
    }
}

fn to_date32(value: &Value, column: &str) -> Result<Option<i32>> {
    let date = match value {
        Value::Null => return Ok(None),
        // `YYYY-MM-DD`, optionally followed by a time part
        Value::Text(s) => s
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
        // `YYYYMMDD`
        Value::Integer(i) => NaiveDate::parse_from_str(&i.to_string(), "%Y%m%d").ok(),
        _ => None,
    };

    date.map(|d| Some(Date32Type::from_naive_date(d)))
        .ok_or_else(|| mismatch(column, value, "date"))
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s.clone()),
        Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Reads cell `index` of an Arrow column as a SQLite value.
pub fn sql_value_from_array(array: &dyn Array, index: usize) -> Result<Value> {
    if array.is_null(index) {
        return Ok(Value::Null);
    }

    Ok(match array.data_type() {
        DataType::Int64 => Value::Integer(array.as_primitive::<Int64Type>().value(index)),
        DataType::Int32 => Value::Integer(array.as_primitive::<Int32Type>().value(index) as i64),
        DataType::Float64 => Value::Real(array.as_primitive::<Float64Type>().value(index)),
        DataType::Float32 => Value::Real(array.as_primitive::<Float32Type>().value(index) as f64),
        DataType::Boolean => Value::Integer(array.as_boolean().value(index) as i64),
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(index).to_string()),
        DataType::LargeUtf8 => Value::Text(array.as_string::<i64>().value(index).to_string()),
        DataType::Date32 => {
            let days = array.as_primitive::<Date32Type>().value(index);
            Value::Text(Date32Type::to_naive_date(days).format("%Y-%m-%d").to_string())
        }
        other => {
            return Err(Error::SchemaMismatch(format!(
                "Cannot write Arrow type {:?} to SQLite",
                other
            )));
        }
    })
}
