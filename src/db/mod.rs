//! Database layer
//!
//! Connection handling, catalog introspection, identifier validation and
//! the row codec. The CRUD engine in [`crate::crud`] is built on top.

pub mod codec;
pub mod identifier;
pub mod postgres;
pub mod record;
pub mod schema;
pub mod types;

// Re-export main types
pub use identifier::{Identifier, TableName};
pub use postgres::PostgresProvider;
pub use record::RecordSnapshot;
pub use schema::{ColumnDescriptor, SchemaRegistry, TableSchema};
pub use types::{CellValue, DataType, TypedValue};
