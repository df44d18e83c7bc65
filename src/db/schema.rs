//! Table metadata and the schema registry
//!
//! The registry maps every managed table to its introspected columns. It is
//! built once at startup and is the allow-list every engine operation checks
//! table and column names against.

use crate::db::identifier::{Identifier, TableName};
use crate::db::postgres::PostgresProvider;
use crate::db::types::DataType;
use crate::error::{CrudError, CrudResult};

/// A table column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: Identifier,
    /// Declared type
    pub data_type: DataType,
    /// Whether this is the table's (single-column) primary key
    pub is_primary_key: bool,
    /// Position in the table declaration (`attnum`)
    pub ordinal: i16,
}

/// A table and its columns in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: TableName,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn new(name: TableName, columns: Vec<ColumnDescriptor>) -> Self {
        Self { name, columns }
    }

    /// The primary key column, if the table declares exactly one
    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        let mut keys = self.columns.iter().filter(|c| c.is_primary_key);
        match (keys.next(), keys.next()) {
            (Some(key), None) => Some(key),
            _ => None,
        }
    }

    /// Like [`primary_key`](Self::primary_key), but absence is an error
    pub fn require_primary_key(&self) -> CrudResult<&ColumnDescriptor> {
        self.primary_key()
            .ok_or_else(|| CrudError::NoPrimaryKey(self.name.to_string()))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.as_str() == name)
    }

    /// Look up a column, rejecting names the table does not have
    pub fn require_column(&self, name: &str) -> CrudResult<&ColumnDescriptor> {
        self.column(name).ok_or_else(|| {
            CrudError::InvalidIdentifier(format!(
                "'{}' is not a column of '{}'",
                name.escape_debug(),
                self.name
            ))
        })
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Managed tables, in the order they were configured
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: Vec<TableSchema>,
}

impl SchemaRegistry {
    #[cfg(test)]
    pub(crate) fn from_tables(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    /// Introspect every table in `names`.
    ///
    /// # Errors
    /// Fails if any table does not exist or cannot be introspected; a
    /// partially loaded registry is never returned.
    pub async fn load(provider: &PostgresProvider, names: &[TableName]) -> CrudResult<Self> {
        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let schema = provider.describe_table(name).await?;
            if schema.primary_key().is_none() {
                tracing::warn!(table = %name, "table has no single-column primary key; update and delete are disabled");
            }
            tables.push(schema);
        }
        tracing::debug!(tables = tables.len(), "schema registry loaded");
        Ok(Self { tables })
    }

    /// Look up a managed table
    ///
    /// # Errors
    /// Returns `CrudError::InvalidIdentifier` for tables outside the registry.
    pub fn table(&self, name: &TableName) -> CrudResult<&TableSchema> {
        self.tables
            .iter()
            .find(|t| &t.name == name)
            .ok_or_else(|| CrudError::InvalidIdentifier(format!("'{}' is not a managed table", name)))
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.iter()
    }
}
