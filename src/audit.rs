//! Append-only audit log
//!
//! Every committed insert/update/delete gets exactly one row in
//! `audit_logs`. The entry is written through the same transaction as the
//! change it documents, so a rolled-back write leaves no entry behind.

use crate::db::codec::format_timestamptz;
use crate::db::identifier::{Identifier, TableName};
use crate::db::record::RecordSnapshot;
use crate::error::{CrudError, CrudResult, DbError, DbResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use tokio_postgres::{GenericClient, Row, Transaction};

/// Default audit table name
pub const AUDIT_TABLE: &str = "audit_logs";

/// Id of the authenticated admin performing a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId(pub i32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of change recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Insert => "INSERT",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(AuditAction::Insert),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            _ => Err(format!("unknown audit action '{}'", s)),
        }
    }
}

/// One audit log row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub table_name: String,
    pub action: AuditAction,
    /// Primary key of the affected row; `None` for tables without one
    pub record_id: Option<String>,
    pub actor_id: ActorId,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry stamped with the current time
    pub fn new(
        table: &TableName,
        action: AuditAction,
        record_id: Option<String>,
        actor_id: ActorId,
    ) -> Self {
        Self {
            table_name: table.to_string(),
            action,
            record_id,
            actor_id,
            timestamp: Utc::now(),
        }
    }

    fn from_row(row: &Row) -> DbResult<Self> {
        let map_err = |e: tokio_postgres::Error| DbError::QueryFailed(e.to_string());
        let action: String = row.try_get(1).map_err(map_err)?;
        Ok(Self {
            table_name: row.try_get(0).map_err(map_err)?,
            action: action.parse().map_err(DbError::QueryFailed)?,
            record_id: row.try_get(2).map_err(map_err)?,
            actor_id: ActorId(row.try_get(3).map_err(map_err)?),
            timestamp: row.try_get(4).map_err(map_err)?,
        })
    }

    /// Display form, in the same shape as any other fetched row
    pub fn to_snapshot(&self) -> RecordSnapshot {
        RecordSnapshot::new(vec![
            ("timestamp".to_string(), Some(format_timestamptz(&self.timestamp))),
            ("admin_id".to_string(), Some(self.actor_id.to_string())),
            ("action".to_string(), Some(self.action.to_string())),
            ("table_name".to_string(), Some(self.table_name.clone())),
            ("record_id".to_string(), self.record_id.clone()),
        ])
    }
}

/// Filter for reading the log back
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub table: Option<TableName>,
    pub action: Option<AuditAction>,
    pub actor: Option<ActorId>,
    pub limit: i64,
}

/// Writes and reads the audit table
#[derive(Debug, Clone)]
pub struct AuditLogger {
    table: Identifier,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self {
            table: Identifier::from_static(AUDIT_TABLE),
        }
    }
}

impl AuditLogger {
    pub fn new(table: Identifier) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Identifier {
        &self.table
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (table_name, action, record_id, admin_id, \"timestamp\") \
             VALUES ($1, $2, $3, $4, $5)",
            self.table.quoted()
        )
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT table_name, action, record_id, admin_id, \"timestamp\" FROM {} \
             WHERE ($1::text IS NULL OR table_name = $1) \
               AND ($2::text IS NULL OR action = $2) \
               AND ($3::int IS NULL OR admin_id = $3) \
             ORDER BY \"timestamp\" DESC \
             LIMIT $4",
            self.table.quoted()
        )
    }

    fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                table_name text NOT NULL, \
                action text NOT NULL, \
                record_id text, \
                admin_id int NOT NULL, \
                \"timestamp\" timestamptz NOT NULL DEFAULT now())",
            self.table.quoted()
        )
    }

    /// Append `entry` inside the caller's transaction.
    ///
    /// A failure here fails the whole write: the caller's transaction is
    /// dropped uncommitted.
    pub async fn record(&self, tx: &Transaction<'_>, entry: &AuditEntry) -> CrudResult<()> {
        tx.execute(
            &self.insert_sql(),
            &[
                &entry.table_name,
                &entry.action.as_str(),
                &entry.record_id,
                &entry.actor_id.0,
                &entry.timestamp,
            ],
        )
        .await
        .map_err(|e| CrudError::Database(DbError::QueryFailed(format!("audit log write failed: {}", e))))?;
        Ok(())
    }

    /// Entries matching `query`, newest first
    pub async fn recent<C: GenericClient>(
        &self,
        client: &C,
        query: &AuditQuery,
    ) -> DbResult<Vec<AuditEntry>> {
        let table = query.table.as_ref().map(|t| t.as_str());
        let action = query.action.map(|a| a.as_str());
        let actor = query.actor.map(|a| a.0);
        let rows = client
            .query(&self.select_sql(), &[&table, &action, &actor, &query.limit.max(0)])
            .await?;
        rows.iter().map(AuditEntry::from_row).collect()
    }

    /// Create the audit table if it does not exist yet
    pub async fn ensure_table<C: GenericClient>(&self, client: &C) -> DbResult<()> {
        client.batch_execute(&self.create_sql()).await?;
        tracing::info!(table = %self.table, "audit table ready");
        Ok(())
    }
}
