//! Statement builders
//!
//! Identifiers come only from a `TableSchema` (already validated and
//! registry-checked) and are always quoted. Every value, including filter
//! patterns and paging bounds, is a bound parameter.

use crate::db::identifier::Identifier;
use crate::db::schema::{ColumnDescriptor, TableSchema};
use crate::db::types::{DataType, TypedValue};
use tokio_postgres::types::ToSql;

/// SQL text plus its parameters, in `$n` order
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<TypedValue>,
}

impl Statement {
    /// Parameters in the form tokio-postgres takes them
    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect()
    }
}

/// A column assignment whose value has already been encoded
#[derive(Debug, Clone, PartialEq)]
pub struct BoundField {
    pub column: Identifier,
    pub value: TypedValue,
}

/// One page of a listing (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub size: u64,
}

impl Page {
    /// Page numbers below 1 are treated as 1, sizes below 1 as 1.
    pub fn new(number: u64, size: u64) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.number - 1).saturating_mul(self.size)
    }

    /// Number of pages needed for `total` rows (at least 1)
    pub fn count_for(total: u64, size: u64) -> u64 {
        total.div_ceil(size.max(1)).max(1)
    }
}

/// Escape `%`, `_` and `\` so the filter matches literally inside ILIKE.
pub fn like_pattern(filter: &str) -> String {
    let mut out = String::with_capacity(filter.len() + 2);
    out.push('%');
    for c in filter.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Types shown exactly as the server prints them. The row codec has no
/// lossless decoder for some (enums and other user-defined types,
/// intervals, arrays, `numeric` past 28 digits) and renders others
/// differently (floats, JSON spacing and key order, blank-padded `char`).
fn selected_as_text(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Real
            | DataType::Double
            | DataType::Numeric
            | DataType::Json
            | DataType::Jsonb
            | DataType::Char(_)
            | DataType::Interval
            | DataType::Array(_)
            | DataType::Unknown(_)
    )
}

fn column_list(schema: &TableSchema) -> String {
    schema
        .columns
        .iter()
        .map(|c| {
            let name = c.name.quoted();
            if selected_as_text(&c.data_type) {
                format!("{}::text AS {}", name, name)
            } else {
                name
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQL expression yielding the same text the row codec displays for
/// `column`, whatever the session's TimeZone, DateStyle or bytea_output.
fn display_expr(column: &ColumnDescriptor) -> String {
    let name = column.name.quoted();
    match &column.data_type {
        DataType::TimestampTz => format!(
            "({} || '+00:00')",
            fixed_datetime(&format!("({} AT TIME ZONE 'UTC')", name), "YYYY-MM-DD HH24:MI:SS")
        ),
        DataType::Timestamp => fixed_datetime(&name, "YYYY-MM-DD HH24:MI:SS"),
        DataType::Time => fixed_datetime(&format!("(DATE '2000-01-01' + {})", name), "HH24:MI:SS"),
        DataType::Date => format!("to_char({}::timestamp, 'YYYY-MM-DD')", name),
        DataType::Bytea => format!("('\\x' || encode({}, 'hex'))", name),
        _ => format!("{}::text", name),
    }
}

/// `to_char` followed by a fraction in chrono's `%.f` shape: nothing when
/// the fraction is zero, else 3 digits when whole milliseconds, else 6.
fn fixed_datetime(ts: &str, pattern: &str) -> String {
    let micros = format!("(extract(microseconds FROM {})::bigint % 1000000)", ts);
    format!(
        "(to_char({ts}, '{pattern}') || CASE WHEN {us} = 0 THEN '' \
         WHEN {us} % 1000 = 0 THEN '.' || lpad(({us} / 1000)::text, 3, '0') \
         ELSE '.' || lpad({us}::text, 6, '0') END)",
        ts = ts,
        pattern = pattern,
        us = micros
    )
}

/// `WHERE (...)` matching `filter` against the displayed text of every
/// column. Pushes the pattern parameter.
fn filter_clause(schema: &TableSchema, filter: Option<&str>, params: &mut Vec<TypedValue>) -> String {
    let Some(filter) = filter.filter(|f| !f.is_empty()) else {
        return String::new();
    };
    if schema.columns.is_empty() {
        return String::new();
    }
    params.push(TypedValue::Text(like_pattern(filter)));
    let n = params.len();
    let conditions: Vec<String> = schema
        .columns
        .iter()
        .map(|c| format!("{} ILIKE ${}", display_expr(c), n))
        .collect();
    format!(" WHERE ({})", conditions.join(" OR "))
}

/// `SELECT` with optional filter and page, ordered by primary key when present
pub fn select(schema: &TableSchema, filter: Option<&str>, page: Option<Page>) -> Statement {
    let mut params = Vec::new();
    let mut sql = format!("SELECT {} FROM {}", column_list(schema), schema.name.quoted());
    sql.push_str(&filter_clause(schema, filter, &mut params));

    if let Some(pk) = schema.primary_key() {
        sql.push_str(&format!(" ORDER BY {}", pk.name.quoted()));
    }

    if let Some(page) = page {
        params.push(TypedValue::BigInt(clamp_i64(page.size)));
        sql.push_str(&format!(" LIMIT ${}", params.len()));
        params.push(TypedValue::BigInt(clamp_i64(page.offset())));
        sql.push_str(&format!(" OFFSET ${}", params.len()));
    }

    Statement { sql, params }
}

/// `SELECT count(*)` with the same filter semantics as [`select`]
pub fn count(schema: &TableSchema, filter: Option<&str>) -> Statement {
    let mut params = Vec::new();
    let mut sql = format!("SELECT count(*) FROM {}", schema.name.quoted());
    sql.push_str(&filter_clause(schema, filter, &mut params));
    Statement { sql, params }
}

/// Single row by primary key
pub fn select_by_key(schema: &TableSchema, pk: &ColumnDescriptor, key: TypedValue) -> Statement {
    Statement {
        sql: format!(
            "SELECT {} FROM {} WHERE {} = $1",
            column_list(schema),
            schema.name.quoted(),
            pk.name.quoted()
        ),
        params: vec![key],
    }
}

/// `INSERT`, returning the primary key as text when the table has one
pub fn insert(schema: &TableSchema, fields: &[BoundField]) -> Statement {
    let mut sql = if fields.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", schema.name.quoted())
    } else {
        let columns: Vec<String> = fields.iter().map(|f| f.column.quoted()).collect();
        let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("${}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.name.quoted(),
            columns.join(", "),
            placeholders.join(", ")
        )
    };

    if let Some(pk) = schema.primary_key() {
        sql.push_str(&format!(" RETURNING {}::text", pk.name.quoted()));
    }

    Statement {
        sql,
        params: fields.iter().map(|f| f.value.clone()).collect(),
    }
}

/// `UPDATE ... SET` over exactly the supplied fields, returning the new row
pub fn update(
    schema: &TableSchema,
    pk: &ColumnDescriptor,
    fields: &[BoundField],
    key: TypedValue,
) -> Statement {
    let assignments: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{} = ${}", f.column.quoted(), i + 1))
        .collect();
    let mut params: Vec<TypedValue> = fields.iter().map(|f| f.value.clone()).collect();
    params.push(key);

    Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
            schema.name.quoted(),
            assignments.join(", "),
            pk.name.quoted(),
            params.len(),
            column_list(schema)
        ),
        params,
    }
}

/// `DELETE` by primary key, returning the removed row
pub fn delete(schema: &TableSchema, pk: &ColumnDescriptor, key: TypedValue) -> Statement {
    Statement {
        sql: format!(
            "DELETE FROM {} WHERE {} = $1 RETURNING {}",
            schema.name.quoted(),
            pk.name.quoted(),
            column_list(schema)
        ),
        params: vec![key],
    }
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
