//! Row codec
//!
//! `decode_row` turns a fetched row into display text, `encode` turns form
//! text into a value bound with the column's exact type. Date/time values
//! use fixed, locale-independent formats in both directions so anything
//! shown to the user can be submitted back unchanged.

use crate::db::record::RecordSnapshot;
use crate::db::schema::ColumnDescriptor;
use crate::db::types::{CellValue, DataType, TypedValue};
use crate::error::FieldError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use tokio_postgres::types::{FromSql, Kind, Type};

/// `timestamp` display/input format
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
/// `timestamptz` display format (always rendered in UTC)
pub const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f+00:00";
/// `timestamptz` input format; the offset may be `+02`, `+0200` or `+02:00`
const TIMESTAMPTZ_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%#z";
/// `date` display/input format
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// `time` display/input format
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Decode every column of `row` into text, using the row's own column types.
pub fn decode_row(row: &tokio_postgres::Row) -> RecordSnapshot {
    let fields = row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let data_type = DataType::from_pg_type(col.type_());
            let value = extract_cell_value(row, i, &data_type);
            (col.name().to_string(), value.to_text())
        })
        .collect();
    RecordSnapshot::new(fields)
}

/// Encode form text for `column`.
///
/// Empty input on a non-text column means NULL.
///
/// # Errors
/// Returns a `FieldError` naming the column when the text does not parse
/// as the column's type, or when the type cannot be edited as text.
pub fn encode(column: &ColumnDescriptor, raw: &str) -> Result<TypedValue, FieldError> {
    let data_type = &column.data_type;
    if raw.is_empty() && !data_type.is_textual() {
        return Ok(TypedValue::Null);
    }

    let fail = |message: String| FieldError::new(column.name.as_str(), message);
    let trimmed = raw.trim();

    match data_type {
        DataType::SmallInt => trimmed
            .parse::<i16>()
            .map(TypedValue::SmallInt)
            .map_err(|_| fail("expected an integer between -32768 and 32767".to_string())),
        DataType::Integer => trimmed
            .parse::<i32>()
            .map(TypedValue::Integer)
            .map_err(|_| fail("expected an integer".to_string())),
        DataType::BigInt => trimmed
            .parse::<i64>()
            .map(TypedValue::BigInt)
            .map_err(|_| fail("expected an integer".to_string())),
        DataType::Real => trimmed
            .parse::<f32>()
            .map(TypedValue::Real)
            .map_err(|_| fail("expected a number".to_string())),
        DataType::Double => trimmed
            .parse::<f64>()
            .map(TypedValue::Double)
            .map_err(|_| fail("expected a number".to_string())),
        DataType::Numeric => trimmed
            .parse::<Decimal>()
            .map(TypedValue::Numeric)
            .map_err(|_| fail("expected a decimal number".to_string())),
        DataType::Boolean => parse_bool(trimmed)
            .map(TypedValue::Boolean)
            .ok_or_else(|| fail("expected true or false".to_string())),
        DataType::Timestamp => parse_timestamp(trimmed)
            .map(TypedValue::Timestamp)
            .ok_or_else(|| fail("expected YYYY-MM-DD HH:MM:SS".to_string())),
        DataType::TimestampTz => parse_timestamptz(trimmed)
            .map(TypedValue::TimestampTz)
            .ok_or_else(|| fail("expected YYYY-MM-DD HH:MM:SS[+HH:MM]".to_string())),
        DataType::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
            .map(TypedValue::Date)
            .map_err(|_| fail("expected YYYY-MM-DD".to_string())),
        DataType::Time => NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
            .map(TypedValue::Time)
            .map_err(|_| fail("expected HH:MM:SS".to_string())),
        DataType::Uuid => uuid::Uuid::parse_str(trimmed)
            .map(TypedValue::Uuid)
            .map_err(|_| fail("expected a UUID".to_string())),
        DataType::Json | DataType::Jsonb => serde_json::from_str(raw)
            .map(TypedValue::Json)
            .map_err(|e| fail(format!("invalid JSON: {}", e))),
        DataType::Varchar(Some(max)) | DataType::Char(Some(max))
            if raw.chars().count() > *max =>
        {
            Err(fail(format!("at most {} characters allowed", max)))
        }
        DataType::Text | DataType::Varchar(_) | DataType::Char(_) | DataType::Unknown(_) => {
            Ok(TypedValue::Text(raw.to_string()))
        }
        DataType::Interval | DataType::Bytea | DataType::Array(_) => Err(fail(format!(
            "{} columns cannot be edited as text",
            data_type.display_name()
        ))),
    }
}

/// Render a `timestamp` in the fixed display format
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Render a `timestamptz` in UTC in the fixed display format
pub fn format_timestamptz(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMPTZ_FORMAT).to_string()
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).ok()
}

fn parse_timestamptz(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_str(text, TIMESTAMPTZ_INPUT_FORMAT) {
        return Some(ts.with_timezone(&Utc));
    }
    // No offset given: the value is taken as UTC
    parse_timestamp(text).map(|naive| naive.and_utc())
}

/// Extract a cell value from a tokio_postgres Row based on the column's DataType.
///
/// Tries the expected type first and falls back to the string
/// representation on a mismatch.
fn extract_cell_value(row: &tokio_postgres::Row, idx: usize, data_type: &DataType) -> CellValue {
    match data_type {
        DataType::SmallInt => match row.try_get::<_, Option<i16>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v as i64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Integer => match row.try_get::<_, Option<i32>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v as i64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::BigInt => match row.try_get::<_, Option<i64>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Real => match row.try_get::<_, Option<f32>>(idx) {
            // Widening to f64 would show 0.1 as 0.10000000149011612
            Ok(Some(v)) => CellValue::Text(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Double => match row.try_get::<_, Option<f64>>(idx) {
            Ok(Some(v)) => CellValue::Float(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Numeric => match row.try_get::<_, Option<Decimal>>(idx) {
            Ok(Some(v)) => CellValue::Text(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Boolean => match row.try_get::<_, Option<bool>>(idx) {
            Ok(Some(v)) => CellValue::Boolean(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Json | DataType::Jsonb => {
            match row.try_get::<_, Option<serde_json::Value>>(idx) {
                Ok(Some(v)) => CellValue::Json(v),
                Ok(None) => CellValue::Null,
                Err(_) => try_as_string(row, idx),
            }
        }
        DataType::Bytea => match row.try_get::<_, Option<Vec<u8>>>(idx) {
            Ok(Some(v)) => CellValue::Binary(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Uuid => match row.try_get::<_, Option<uuid::Uuid>>(idx) {
            Ok(Some(v)) => CellValue::Uuid(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Timestamp => match row.try_get::<_, Option<NaiveDateTime>>(idx) {
            Ok(Some(v)) => CellValue::DateTime(format_timestamp(&v)),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::TimestampTz => match row.try_get::<_, Option<DateTime<Utc>>>(idx) {
            Ok(Some(v)) => CellValue::DateTime(format_timestamptz(&v)),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Date => match row.try_get::<_, Option<NaiveDate>>(idx) {
            Ok(Some(v)) => CellValue::DateTime(v.format(DATE_FORMAT).to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Time => match row.try_get::<_, Option<NaiveTime>>(idx) {
            Ok(Some(v)) => CellValue::DateTime(v.format(TIME_FORMAT).to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Array(inner) => extract_array_value(row, idx, inner),
        // Text types, intervals and anything unknown
        _ => try_as_string(row, idx),
    }
}

/// Extract an array value, falling back to the string form for element
/// types without a direct Rust mapping.
fn extract_array_value(row: &tokio_postgres::Row, idx: usize, inner: &DataType) -> CellValue {
    fn collect<T>(values: Vec<Option<T>>, f: impl Fn(T) -> CellValue) -> CellValue {
        CellValue::Array(
            values
                .into_iter()
                .map(|v| v.map_or(CellValue::Null, &f))
                .collect(),
        )
    }

    match inner {
        DataType::Text | DataType::Varchar(_) | DataType::Char(_) => {
            match row.try_get::<_, Option<Vec<Option<String>>>>(idx) {
                Ok(Some(v)) => collect(v, CellValue::Text),
                Ok(None) => CellValue::Null,
                Err(_) => try_as_string(row, idx),
            }
        }
        DataType::SmallInt => match row.try_get::<_, Option<Vec<Option<i16>>>>(idx) {
            Ok(Some(v)) => collect(v, |n| CellValue::Integer(n as i64)),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Integer => match row.try_get::<_, Option<Vec<Option<i32>>>>(idx) {
            Ok(Some(v)) => collect(v, |n| CellValue::Integer(n as i64)),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::BigInt => match row.try_get::<_, Option<Vec<Option<i64>>>>(idx) {
            Ok(Some(v)) => collect(v, CellValue::Integer),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Boolean => match row.try_get::<_, Option<Vec<Option<bool>>>>(idx) {
            Ok(Some(v)) => collect(v, CellValue::Boolean),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Numeric => match row.try_get::<_, Option<Vec<Option<Decimal>>>>(idx) {
            Ok(Some(v)) => collect(v, |d| CellValue::Text(d.to_string())),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        _ => try_as_string(row, idx),
    }
}

/// Label of a user-defined enum value. Its binary form is the label text.
struct EnumLabel(String);

impl<'a> FromSql<'a> for EnumLabel {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(EnumLabel(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

/// Try to extract a value as a string (fallback for type mismatches).
fn try_as_string(row: &tokio_postgres::Row, idx: usize) -> CellValue {
    if let Ok(label) = row.try_get::<_, Option<EnumLabel>>(idx) {
        return label.map_or(CellValue::Null, |l| CellValue::Text(l.0));
    }
    match row.try_get::<_, Option<String>>(idx) {
        Ok(Some(v)) => CellValue::Text(v),
        Ok(None) => CellValue::Null,
        Err(_) => {
            let type_name = row
                .columns()
                .get(idx)
                .map_or("unknown", |c| c.type_().name());
            CellValue::Text(format!("<unable to display: {}>", type_name))
        }
    }
}
