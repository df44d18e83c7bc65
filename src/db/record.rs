//! Fetched rows as display text

/// Marker shown in place of a SQL NULL
pub const NULL_DISPLAY: &str = "NULL";

/// One fetched row, column name to value-as-text, in column order.
///
/// `None` is SQL NULL, kept distinct from the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSnapshot {
    fields: Vec<(String, Option<String>)>,
}

impl RecordSnapshot {
    pub fn new(fields: Vec<(String, Option<String>)>) -> Self {
        Self { fields }
    }

    /// Value of `column`: outer `None` if there is no such column,
    /// inner `None` if the value is NULL.
    pub fn field(&self, column: &str) -> Option<Option<&str>> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_deref())
    }

    /// Text of `column`, or `None` when it is NULL or absent
    pub fn text(&self, column: &str) -> Option<&str> {
        self.field(column).flatten()
    }

    /// Text of `column` with NULL rendered as [`NULL_DISPLAY`]; absent
    /// columns render empty.
    pub fn display(&self, column: &str) -> &str {
        match self.field(column) {
            Some(Some(text)) => text,
            Some(None) => NULL_DISPLAY,
            None => "",
        }
    }

    pub fn is_null(&self, column: &str) -> bool {
        matches!(self.field(column), Some(None))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
