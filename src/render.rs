//! Console output rendering (aligned table / CSV / JSON)
//!
//! Pure string building, no I/O. Values arrive as text already decoded by
//! the row codec; NULL stays distinguishable in every format.

use crate::db::record::{NULL_DISPLAY, RecordSnapshot};
use unicode_truncate::{Alignment, UnicodeTruncateStr};
use unicode_width::UnicodeWidthStr;

/// Widest a table column is allowed to get, in terminal cells
const MAX_COLUMN_WIDTH: usize = 40;
const MIN_COLUMN_WIDTH: usize = 4;
const ELLIPSIS: &str = "...";

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
}

/// Render `rows` under the header `columns`.
pub fn render(format: OutputFormat, columns: &[&str], rows: &[RecordSnapshot]) -> String {
    match format {
        OutputFormat::Table => to_table(columns, rows),
        OutputFormat::Csv => to_csv(columns, rows),
        OutputFormat::Json => to_json(columns, rows),
    }
}

/// Render a single record vertically, one `column | value` line per field.
pub fn render_record(record: &RecordSnapshot) -> String {
    let label_width = record
        .columns()
        .map(UnicodeWidthStr::width)
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for (column, value) in record.iter() {
        out.push_str(&column.unicode_pad(label_width, Alignment::Left, false));
        out.push_str(" | ");
        out.push_str(&single_line(value.unwrap_or(NULL_DISPLAY)));
        out.push('\n');
    }
    out
}

/// Aligned text table with a header rule.
pub fn to_table(columns: &[&str], rows: &[RecordSnapshot]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| single_line(row.display(c)))
                .collect()
        })
        .collect();
    let widths = compute_column_widths(columns, &cells);

    let mut out = String::new();
    push_table_line(&mut out, columns.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');
    for row in &cells {
        push_table_line(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn push_table_line<'a>(out: &mut String, values: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = values
        .zip(widths)
        .map(|(value, width)| fit(value, *width))
        .collect();
    out.push_str(padded.join(" | ").trim_end());
    out.push('\n');
}

/// Column widths from the header and every cell, clamped to a sane range.
fn compute_column_widths(columns: &[&str], cells: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.width());
            }
        }
    }
    for w in &mut widths {
        *w = (*w).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH);
    }
    widths
}

/// Pad to exactly `width` cells, truncating with an ellipsis if needed.
fn fit(value: &str, width: usize) -> String {
    if value.width() <= width {
        return value.unicode_pad(width, Alignment::Left, false).into_owned();
    }
    let (head, _) = value.unicode_truncate(width.saturating_sub(ELLIPSIS.len()));
    format!("{}{}", head, ELLIPSIS)
        .unicode_pad(width, Alignment::Left, true)
        .into_owned()
}

/// Tabs and line breaks would break the table grid.
fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// RFC 4180 CSV. NULL is an empty field and the empty string is `""`,
/// the same convention as PostgreSQL's `COPY ... CSV`.
pub fn to_csv(columns: &[&str], rows: &[RecordSnapshot]) -> String {
    let mut out = String::new();

    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        csv_escape_into(&mut out, col);
    }
    out.push('\n');

    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            match row.text(col) {
                None => {}
                Some("") => out.push_str("\"\""),
                Some(text) => csv_escape_into(&mut out, text),
            }
        }
        out.push('\n');
    }

    out
}

/// JSON array of objects; values are strings, NULL is `null`.
pub fn to_json(columns: &[&str], rows: &[RecordSnapshot]) -> String {
    let rows: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            let obj: serde_json::Map<String, serde_json::Value> = columns
                .iter()
                .map(|col| {
                    let value = match row.text(col) {
                        Some(text) => serde_json::Value::String(text.to_string()),
                        None => serde_json::Value::Null,
                    };
                    (col.to_string(), value)
                })
                .collect();
            serde_json::Value::Object(obj)
        })
        .collect();

    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

/// Quote a field if it contains `,` `"` or a newline (RFC 4180).
fn csv_escape_into(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}
