//! Metadata-driven CRUD engine
//!
//! The engine owns the schema registry and the audit logger; the connection
//! is supplied by the caller on every call. Writes run in a transaction that
//! also carries the audit entry, so either both land or neither does.

pub mod sql;

use crate::audit::{ActorId, AuditAction, AuditEntry, AuditLogger};
use crate::db::codec::{decode_row, encode};
use crate::db::identifier::TableName;
use crate::db::postgres::PostgresProvider;
use crate::db::record::RecordSnapshot;
use crate::db::schema::{ColumnDescriptor, SchemaRegistry, TableSchema};
use crate::db::types::TypedValue;
use crate::error::{CrudError, CrudResult, FieldError};
use sql::{BoundField, Page, Statement};
use std::collections::BTreeMap;

/// Form input: column name to raw text
pub type FieldValues = BTreeMap<String, String>;

/// Options for [`CrudEngine::list`]
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Case-insensitive substring matched against every column
    pub filter: Option<String>,
    /// `None` returns every matching row
    pub page: Option<Page>,
}

/// Row state around an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub before: RecordSnapshot,
    pub after: RecordSnapshot,
}

impl UpdateOutcome {
    /// Columns whose value differs between `before` and `after`
    pub fn changed_columns(&self) -> Vec<&str> {
        self.after
            .iter()
            .filter(|(col, value)| self.before.field(col) != Some(*value))
            .map(|(col, _)| col)
            .collect()
    }
}

pub struct CrudEngine {
    registry: SchemaRegistry,
    audit: AuditLogger,
}

impl CrudEngine {
    pub fn new(registry: SchemaRegistry, audit: AuditLogger) -> Self {
        Self { registry, audit }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Schema of a managed table
    pub fn schema(&self, table: &TableName) -> CrudResult<&TableSchema> {
        self.registry.table(table)
    }

    /// Rows of `table`, optionally filtered and paged
    pub async fn list(
        &self,
        db: &PostgresProvider,
        table: &TableName,
        query: &ListQuery,
    ) -> CrudResult<Vec<RecordSnapshot>> {
        let schema = self.schema(table)?;
        let stmt = sql::select(schema, query.filter.as_deref(), query.page);
        log_statement(&stmt);

        let rows = db.client().query(&stmt.sql, &stmt.params()).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    /// Number of rows [`list`](Self::list) would return without a page
    pub async fn count(
        &self,
        db: &PostgresProvider,
        table: &TableName,
        filter: Option<&str>,
    ) -> CrudResult<u64> {
        let schema = self.schema(table)?;
        let stmt = sql::count(schema, filter);
        log_statement(&stmt);

        let row = db.client().query_one(&stmt.sql, &stmt.params()).await?;
        let total: i64 = row.try_get(0)?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    /// One row by primary key
    ///
    /// # Errors
    /// `NoPrimaryKey` if the table has no single-column key and
    /// `RecordNotFound` if no row has `key`.
    pub async fn fetch(
        &self,
        db: &PostgresProvider,
        table: &TableName,
        key: &str,
    ) -> CrudResult<RecordSnapshot> {
        let schema = self.schema(table)?;
        let pk = schema.require_primary_key()?;
        let stmt = sql::select_by_key(schema, pk, encode_key(pk, key)?);
        log_statement(&stmt);

        db.client()
            .query_opt(&stmt.sql, &stmt.params())
            .await?
            .map(|row| decode_row(&row))
            .ok_or_else(|| not_found(table, key))
    }

    /// Insert a row and record it in the audit log.
    ///
    /// Returns the new row's primary key as text, or `None` when the table
    /// has no primary key.
    pub async fn insert(
        &self,
        db: &mut PostgresProvider,
        actor: ActorId,
        table: &TableName,
        fields: &FieldValues,
    ) -> CrudResult<Option<String>> {
        let schema = self.schema(table)?;
        let bound = bind_fields(schema, fields)?;
        let stmt = sql::insert(schema, &bound);
        log_statement(&stmt);

        let tx = db.transaction().await?;
        let record_id = if schema.primary_key().is_some() {
            let row = tx
                .query_one(&stmt.sql, &stmt.params())
                .await
                .map_err(|e| write_failed(table, AuditAction::Insert, e))?;
            row.try_get::<_, Option<String>>(0)?
        } else {
            tx.execute(&stmt.sql, &stmt.params())
                .await
                .map_err(|e| write_failed(table, AuditAction::Insert, e))?;
            None
        };

        let entry = AuditEntry::new(table, AuditAction::Insert, record_id.clone(), actor);
        self.audit.record(&tx, &entry).await?;
        tx.commit().await?;

        log_committed(&entry);
        Ok(record_id)
    }

    /// Update the supplied columns of the row with `key`.
    ///
    /// An empty `fields` writes nothing and records nothing; the current row
    /// comes back as both `before` and `after`.
    pub async fn update_by_key(
        &self,
        db: &mut PostgresProvider,
        actor: ActorId,
        table: &TableName,
        key: &str,
        fields: &FieldValues,
    ) -> CrudResult<UpdateOutcome> {
        let schema = self.schema(table)?;
        let pk = schema.require_primary_key()?;
        let bound = bind_fields(schema, fields)?;
        let key_value = encode_key(pk, key)?;

        if bound.is_empty() {
            let current = self.fetch(db, table, key).await?;
            return Ok(UpdateOutcome {
                before: current.clone(),
                after: current,
            });
        }

        let read = sql::select_by_key(schema, pk, key_value.clone());
        let write = sql::update(schema, pk, &bound, key_value);
        log_statement(&write);

        let tx = db.transaction().await?;
        let before = tx
            .query_opt(&read.sql, &read.params())
            .await?
            .map(|row| decode_row(&row))
            .ok_or_else(|| not_found(table, key))?;
        let after = tx
            .query_opt(&write.sql, &write.params())
            .await
            .map_err(|e| write_failed(table, AuditAction::Update, e))?
            .map(|row| decode_row(&row))
            .ok_or_else(|| not_found(table, key))?;

        let entry = AuditEntry::new(table, AuditAction::Update, Some(key.to_string()), actor);
        self.audit.record(&tx, &entry).await?;
        tx.commit().await?;

        log_committed(&entry);
        Ok(UpdateOutcome { before, after })
    }

    /// Delete the row with `key`, returning what was removed
    ///
    /// # Errors
    /// `RecordNotFound` when nothing matched, `ConstraintViolation` when
    /// another table still references the row.
    pub async fn delete_by_key(
        &self,
        db: &mut PostgresProvider,
        actor: ActorId,
        table: &TableName,
        key: &str,
    ) -> CrudResult<RecordSnapshot> {
        let schema = self.schema(table)?;
        let pk = schema.require_primary_key()?;
        let stmt = sql::delete(schema, pk, encode_key(pk, key)?);
        log_statement(&stmt);

        let tx = db.transaction().await?;
        let removed = tx
            .query_opt(&stmt.sql, &stmt.params())
            .await
            .map_err(|e| write_failed(table, AuditAction::Delete, e))?
            .map(|row| decode_row(&row))
            .ok_or_else(|| not_found(table, key))?;

        let entry = AuditEntry::new(table, AuditAction::Delete, Some(key.to_string()), actor);
        self.audit.record(&tx, &entry).await?;
        tx.commit().await?;

        log_committed(&entry);
        Ok(removed)
    }
}

/// Check every field name against the schema, then encode every value.
///
/// Unknown columns are reported before any value is looked at. Encoding
/// failures are collected so the caller sees all of them at once.
pub fn bind_fields(schema: &TableSchema, fields: &FieldValues) -> CrudResult<Vec<BoundField>> {
    let columns = fields
        .keys()
        .map(|name| schema.require_column(name))
        .collect::<CrudResult<Vec<&ColumnDescriptor>>>()?;

    let mut bound = Vec::with_capacity(fields.len());
    let mut errors = Vec::new();
    for (column, raw) in columns.into_iter().zip(fields.values()) {
        match encode(column, raw) {
            Ok(value) => bound.push(BoundField {
                column: column.name.clone(),
                value,
            }),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(bound)
    } else {
        Err(CrudError::InvalidFieldValue(errors))
    }
}

fn encode_key(pk: &ColumnDescriptor, key: &str) -> CrudResult<TypedValue> {
    if key.trim().is_empty() {
        return Err(CrudError::InvalidFieldValue(vec![FieldError::new(
            pk.name.as_str(),
            "a key value is required",
        )]));
    }
    encode(pk, key).map_err(|e| CrudError::InvalidFieldValue(vec![e]))
}

fn not_found(table: &TableName, key: &str) -> CrudError {
    CrudError::RecordNotFound {
        table: table.to_string(),
        key: key.to_string(),
    }
}

fn write_failed(table: &TableName, action: AuditAction, err: tokio_postgres::Error) -> CrudError {
    let err = CrudError::from(err);
    if let CrudError::ConstraintViolation { kind, constraint, .. } = &err {
        tracing::warn!(
            table = %table,
            action = %action,
            kind = %kind,
            constraint = constraint.as_deref().unwrap_or(""),
            "write rejected by constraint"
        );
    }
    err
}

fn log_statement(stmt: &Statement) {
    tracing::debug!(sql = %stmt.sql, params = stmt.params.len(), "executing");
}

fn log_committed(entry: &AuditEntry) {
    tracing::info!(
        table = %entry.table_name,
        action = %entry.action,
        record_id = entry.record_id.as_deref().unwrap_or(""),
        actor = %entry.actor_id,
        "write committed"
    );
}
