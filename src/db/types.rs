//! Database type definitions
//!
//! Core data structures for column types, values read back from the
//! database, and values bound into statements.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

/// Database data types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    // Integer types
    SmallInt,
    Integer,
    BigInt,

    // Floating point
    Real,
    Double,
    Numeric,

    // Text types
    Text,
    Varchar(Option<usize>),
    Char(Option<usize>),

    // Boolean
    Boolean,

    // Date/time types
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,

    // JSON types
    Json,
    Jsonb,

    // Binary data
    Bytea,

    // UUID
    Uuid,

    // Array type
    Array(Box<DataType>),

    // Other/unknown types (enums, domains, extensions)
    Unknown(String),
}

/// A cell value read back from the database
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// NULL value
    Null,

    /// Integer value
    Integer(i64),

    /// Floating point value
    Float(f64),

    /// Text/string value
    Text(String),

    /// Boolean value
    Boolean(bool),

    /// JSON value (parsed)
    Json(serde_json::Value),

    /// Binary data
    Binary(Vec<u8>),

    /// Date/time value, already rendered in its fixed format
    DateTime(String),

    /// UUID value
    Uuid(String),

    /// Array value
    Array(Vec<CellValue>),
}

/// A value ready to be bound as a statement parameter
///
/// Each variant carries the Rust type tokio-postgres expects for the
/// matching column type, so binding never relies on server-side casts.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Numeric(Decimal),
    Boolean(bool),
    Text(String),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
}

impl DataType {
    /// Get a human-readable display name for this type
    pub fn display_name(&self) -> String {
        match self {
            DataType::SmallInt => "smallint".to_string(),
            DataType::Integer => "integer".to_string(),
            DataType::BigInt => "bigint".to_string(),
            DataType::Real => "real".to_string(),
            DataType::Double => "double precision".to_string(),
            DataType::Numeric => "numeric".to_string(),
            DataType::Text => "text".to_string(),
            DataType::Varchar(Some(n)) => format!("varchar({})", n),
            DataType::Varchar(None) => "varchar".to_string(),
            DataType::Char(Some(n)) => format!("char({})", n),
            DataType::Char(None) => "char".to_string(),
            DataType::Boolean => "boolean".to_string(),
            DataType::Date => "date".to_string(),
            DataType::Time => "time".to_string(),
            DataType::Timestamp => "timestamp".to_string(),
            DataType::TimestampTz => "timestamptz".to_string(),
            DataType::Interval => "interval".to_string(),
            DataType::Json => "json".to_string(),
            DataType::Jsonb => "jsonb".to_string(),
            DataType::Bytea => "bytea".to_string(),
            DataType::Uuid => "uuid".to_string(),
            DataType::Array(inner) => format!("{}[]", inner.display_name()),
            DataType::Unknown(s) => s.clone(),
        }
    }

    /// Whether form input for this type is stored as-is (so an empty
    /// string stays an empty string rather than becoming NULL)
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            DataType::Text | DataType::Varchar(_) | DataType::Char(_) | DataType::Unknown(_)
        )
    }

    /// Map a tokio-postgres wire type to our DataType enum
    pub fn from_pg_type(pg_type: &Type) -> DataType {
        match *pg_type {
            Type::INT2 => DataType::SmallInt,
            Type::INT4 => DataType::Integer,
            Type::INT8 => DataType::BigInt,
            Type::FLOAT4 => DataType::Real,
            Type::FLOAT8 => DataType::Double,
            Type::NUMERIC => DataType::Numeric,
            Type::TEXT | Type::NAME => DataType::Text,
            Type::VARCHAR => DataType::Varchar(None),
            Type::CHAR | Type::BPCHAR => DataType::Char(None),
            Type::BOOL => DataType::Boolean,
            Type::DATE => DataType::Date,
            Type::TIME => DataType::Time,
            Type::TIMESTAMP => DataType::Timestamp,
            Type::TIMESTAMPTZ => DataType::TimestampTz,
            Type::INTERVAL => DataType::Interval,
            Type::JSON => DataType::Json,
            Type::JSONB => DataType::Jsonb,
            Type::BYTEA => DataType::Bytea,
            Type::UUID => DataType::Uuid,
            Type::BOOL_ARRAY => DataType::Array(Box::new(DataType::Boolean)),
            Type::INT2_ARRAY => DataType::Array(Box::new(DataType::SmallInt)),
            Type::INT4_ARRAY => DataType::Array(Box::new(DataType::Integer)),
            Type::INT8_ARRAY => DataType::Array(Box::new(DataType::BigInt)),
            Type::FLOAT4_ARRAY => DataType::Array(Box::new(DataType::Real)),
            Type::FLOAT8_ARRAY => DataType::Array(Box::new(DataType::Double)),
            Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY => {
                DataType::Array(Box::new(DataType::Text))
            }
            Type::UUID_ARRAY => DataType::Array(Box::new(DataType::Uuid)),
            Type::NUMERIC_ARRAY => DataType::Array(Box::new(DataType::Numeric)),
            _ => DataType::Unknown(pg_type.name().to_string()),
        }
    }

    /// Map `format_type()` output to our DataType enum.
    ///
    /// `format_type()` returns strings like "integer", "character varying(255)",
    /// "numeric(10,2)", "timestamp with time zone", "text[]", etc.
    pub fn from_format_type(type_name: &str) -> DataType {
        if let Some(inner) = type_name.strip_suffix("[]") {
            return DataType::Array(Box::new(DataType::from_format_type(inner)));
        }

        // Parameterized types: "numeric(10,2)", "timestamp(3) without time zone"
        let (base, params) = match (type_name.find('('), type_name.find(')')) {
            (Some(open), Some(close)) if close > open => {
                let base = format!("{}{}", &type_name[..open], &type_name[close + 1..]);
                (base, Some(&type_name[open + 1..close]))
            }
            _ => (type_name.to_string(), None),
        };

        match base.trim() {
            "smallint" => DataType::SmallInt,
            "integer" => DataType::Integer,
            "bigint" => DataType::BigInt,
            "real" => DataType::Real,
            "double precision" => DataType::Double,
            "numeric" => DataType::Numeric,
            "text" | "name" => DataType::Text,
            "character varying" => DataType::Varchar(params.and_then(|p| p.parse().ok())),
            "character" => DataType::Char(params.and_then(|p| p.parse().ok())),
            "boolean" => DataType::Boolean,
            "date" => DataType::Date,
            "time without time zone" => DataType::Time,
            "timestamp without time zone" => DataType::Timestamp,
            "timestamp with time zone" => DataType::TimestampTz,
            "interval" => DataType::Interval,
            "json" => DataType::Json,
            "jsonb" => DataType::Jsonb,
            "bytea" => DataType::Bytea,
            "uuid" => DataType::Uuid,
            other => DataType::Unknown(other.to_string()),
        }
    }
}

impl CellValue {
    /// Full textual form of the value; `None` for SQL NULL
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            CellValue::Null => return None,
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Json(v) => v.to_string(),
            CellValue::Binary(b) => hex_encode(b),
            CellValue::DateTime(s) => s.clone(),
            CellValue::Uuid(s) => s.clone(),
            CellValue::Array(arr) => {
                let items: Vec<String> = arr
                    .iter()
                    .map(|v| v.to_text().unwrap_or_else(|| "NULL".to_string()))
                    .collect();
                format!("{{{}}}", items.join(","))
            }
        };
        Some(text)
    }
}

/// Hex-encode binary data in PostgreSQL's escape form (e.g. `\xdeadbeef`).
fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("\\x");
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

impl ToSql for TypedValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            TypedValue::Null => Ok(IsNull::Yes),
            TypedValue::SmallInt(v) => v.to_sql(ty, out),
            TypedValue::Integer(v) => v.to_sql(ty, out),
            TypedValue::BigInt(v) => v.to_sql(ty, out),
            TypedValue::Real(v) => v.to_sql(ty, out),
            TypedValue::Double(v) => v.to_sql(ty, out),
            TypedValue::Numeric(v) => v.to_sql(ty, out),
            TypedValue::Boolean(v) => v.to_sql(ty, out),
            TypedValue::Text(v) => v.to_sql(ty, out),
            TypedValue::Timestamp(v) => v.to_sql(ty, out),
            TypedValue::TimestampTz(v) => v.to_sql(ty, out),
            TypedValue::Date(v) => v.to_sql(ty, out),
            TypedValue::Time(v) => v.to_sql(ty, out),
            TypedValue::Uuid(v) => v.to_sql(ty, out),
            TypedValue::Json(v) => v.to_sql(ty, out),
        }
    }

    // The codec picks the variant from the column's declared type, and the
    // server rejects a mismatched binary encoding anyway.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
