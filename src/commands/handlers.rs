//! Command execution
//!
//! Runs a parsed [`Command`] against the engine and returns the text to print.

use crate::audit::{ActorId, AuditAction, AuditQuery};
use crate::commands::Command;
use crate::commands::parser::parse_assignments;
use crate::crud::sql::Page;
use crate::crud::{CrudEngine, ListQuery};
use crate::db::identifier::{Identifier, TableName};
use crate::db::postgres::PostgresProvider;
use crate::db::record::RecordSnapshot;
use crate::error::{CommandError, Result};
use crate::render::{OutputFormat, render, render_record};

/// One console session: engine, connection scope and acting admin
pub struct Console {
    engine: CrudEngine,
    db: PostgresProvider,
    actor: Option<ActorId>,
    page_size: u64,
    format: OutputFormat,
}

impl Console {
    pub fn new(
        engine: CrudEngine,
        db: PostgresProvider,
        actor: Option<ActorId>,
        page_size: u64,
        format: OutputFormat,
    ) -> Self {
        Self {
            engine,
            db,
            actor,
            page_size: page_size.max(1),
            format,
        }
    }

    /// Execute a command and return its output
    pub async fn execute(&mut self, command: Command) -> Result<String> {
        // Rejected before anything touches the database.
        if command.is_write() && self.actor.is_none() {
            return Err(CommandError::MissingActor.into());
        }
        let actor = self.actor;

        match command {
            Command::Tables => Ok(self.tables()),

            Command::Describe { table } => self.describe(&table),

            Command::List {
                table,
                filter,
                page,
                page_size,
                all,
            } => {
                let table = Identifier::parse(&table)?;
                let filter = filter.filter(|f| !f.is_empty());
                let page = (!all).then(|| Page::new(page, page_size.unwrap_or(self.page_size)));
                self.list(&table, filter, page).await
            }

            Command::Show { table, key } => {
                let table = Identifier::parse(&table)?;
                let record = self.engine.fetch(&self.db, &table, &key).await?;
                Ok(self.single(&table, &record))
            }

            Command::Insert { table, fields } => {
                let table = Identifier::parse(&table)?;
                let fields = parse_assignments(&fields)?;
                let actor = actor.ok_or(CommandError::MissingActor)?;
                let id = self
                    .engine
                    .insert(&mut self.db, actor, &table, &fields)
                    .await?;
                Ok(match id {
                    Some(id) => format!("Inserted into {} with key {}", table, id),
                    None => format!("Inserted into {}", table),
                })
            }

            Command::Update { table, key, fields } => {
                let table = Identifier::parse(&table)?;
                let fields = parse_assignments(&fields)?;
                let actor = actor.ok_or(CommandError::MissingActor)?;
                let outcome = self
                    .engine
                    .update_by_key(&mut self.db, actor, &table, &key, &fields)
                    .await?;
                let changed = outcome.changed_columns();
                let summary = if changed.is_empty() {
                    format!("Updated {} {} (no values changed)", table, key)
                } else {
                    format!("Updated {} {}: {}", table, key, changed.join(", "))
                };
                Ok(format!("{}\n{}", summary, self.single(&table, &outcome.after)))
            }

            Command::Delete { table, key } => {
                let table = Identifier::parse(&table)?;
                let actor = actor.ok_or(CommandError::MissingActor)?;
                let removed = self
                    .engine
                    .delete_by_key(&mut self.db, actor, &table, &key)
                    .await?;
                Ok(format!(
                    "Deleted {} {}\n{}",
                    table,
                    key,
                    self.single(&table, &removed)
                ))
            }

            Command::Audit {
                table,
                action,
                by,
                limit,
            } => {
                let query = AuditQuery {
                    table: table.as_deref().map(Identifier::parse).transpose()?,
                    action: action
                        .as_deref()
                        .map(str::parse::<AuditAction>)
                        .transpose()
                        .map_err(CommandError::InvalidArgument)?,
                    actor: by.map(ActorId),
                    limit,
                };
                let entries = self
                    .engine
                    .audit()
                    .recent(self.db.client(), &query)
                    .await?;
                let rows: Vec<RecordSnapshot> = entries.iter().map(|e| e.to_snapshot()).collect();
                let columns: Vec<&str> = rows
                    .first()
                    .map(|r| r.columns().collect())
                    .unwrap_or_else(|| AUDIT_COLUMNS.to_vec());
                Ok(render(self.format, &columns, &rows))
            }

            Command::InitAudit => {
                self.engine.audit().ensure_table(self.db.client()).await?;
                Ok(format!("Audit table {} is ready", self.engine.audit().table()))
            }
        }
    }

    fn tables(&self) -> String {
        let mut out = String::new();
        for schema in self.engine.registry().tables() {
            let key = schema
                .primary_key()
                .map(|pk| pk.name.to_string())
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!("{} (key: {})\n", schema.name, key));
        }
        out
    }

    fn describe(&self, table: &str) -> Result<String> {
        let table = Identifier::parse(table)?;
        let schema = self.engine.schema(&table)?;
        let rows: Vec<RecordSnapshot> = schema
            .columns
            .iter()
            .map(|c| {
                RecordSnapshot::new(vec![
                    ("column".to_string(), Some(c.name.to_string())),
                    ("type".to_string(), Some(c.data_type.display_name())),
                    (
                        "key".to_string(),
                        Some((if c.is_primary_key { "PK" } else { "" }).to_string()),
                    ),
                ])
            })
            .collect();
        Ok(render(self.format, &["column", "type", "key"], &rows))
    }

    async fn list(
        &self,
        table: &TableName,
        filter: Option<String>,
        page: Option<Page>,
    ) -> Result<String> {
        let schema = self.engine.schema(table)?;
        let query = ListQuery { filter, page };
        let rows = self.engine.list(&self.db, table, &query).await?;
        let mut out = render(self.format, &schema.column_names(), &rows);

        // Page footer only in table output; csv/json stay machine-readable.
        if let (Some(page), OutputFormat::Table) = (page, self.format) {
            let total = self
                .engine
                .count(&self.db, table, query.filter.as_deref())
                .await?;
            out.push_str(&format!(
                "page {}/{} ({} rows)\n",
                page.number,
                Page::count_for(total, page.size),
                total
            ));
        }
        Ok(out)
    }

    fn single(&self, table: &TableName, record: &RecordSnapshot) -> String {
        match self.format {
            OutputFormat::Table => render_record(record),
            format => {
                let columns: Vec<&str> = match self.engine.schema(table) {
                    Ok(schema) => schema.column_names(),
                    Err(_) => record.columns().collect(),
                };
                render(format, &columns, std::slice::from_ref(record))
            }
        }
    }
}

const AUDIT_COLUMNS: [&str; 5] = ["timestamp", "admin_id", "action", "table_name", "record_id"];
