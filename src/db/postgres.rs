//! PostgreSQL connection provider and schema introspection
//!
//! Concrete implementation using tokio-postgres.

use crate::config::ConnectionConfig;
use crate::config::connections::SslMode;
use crate::db::identifier::{Identifier, TableName};
use crate::db::schema::{ColumnDescriptor, TableSchema};
use crate::db::types::DataType;
use crate::error::{CrudError, CrudResult, DbError, DbResult};
use tokio_postgres::{Client, Transaction};

/// Resolves a table through the search path, preserving case.
const RELKIND_SQL: &str = "SELECT c.relkind::text \
     FROM pg_class c \
     WHERE c.oid = to_regclass(quote_ident($1))";

const COLUMNS_SQL: &str = "SELECT a.attname, format_type(a.atttypid, a.atttypmod), a.attnum \
     FROM pg_attribute a \
     WHERE a.attrelid = to_regclass(quote_ident($1)) \
       AND a.attnum > 0 AND NOT a.attisdropped \
     ORDER BY a.attnum";

const PRIMARY_KEY_SQL: &str = "SELECT a.attname \
     FROM pg_index i \
     JOIN LATERAL unnest(i.indkey) WITH ORDINALITY AS k(attnum, ord) ON true \
     JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum \
     WHERE i.indrelid = to_regclass(quote_ident($1)) AND i.indisprimary \
     ORDER BY k.ord";

/// PostgreSQL connection scope
///
/// Owned by the caller and passed into each engine operation; nothing in
/// the crate keeps a connection in global state.
pub struct PostgresProvider {
    /// The tokio-postgres client
    client: Client,
}

impl PostgresProvider {
    /// Connect to a PostgreSQL database.
    ///
    /// The connection driver runs on a spawned task and logs a warning if
    /// the connection drops; later calls then fail with a database error.
    pub async fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        let conn_string = config.connection_string_with_password();

        let client = match config.ssl_mode {
            SslMode::Disable => {
                let (client, connection) =
                    tokio_postgres::connect(&conn_string, tokio_postgres::NoTls)
                        .await
                        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::warn!(error = %e, "database connection lost");
                    }
                });
                client
            }
            SslMode::Prefer | SslMode::Require => {
                let tls_config = make_tls_config();
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
                let (client, connection) = tokio_postgres::connect(&conn_string, tls)
                    .await
                    .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::warn!(error = %e, "database connection lost");
                    }
                });
                client
            }
        };

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "connected"
        );

        Ok(Self { client })
    }

    /// The underlying client, for reads outside a transaction
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Whether the background connection is still alive
    pub fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }

    /// Open a transaction. Dropping it without `commit()` rolls back.
    pub async fn transaction(&mut self) -> DbResult<Transaction<'_>> {
        self.client.transaction().await.map_err(DbError::from)
    }

    /// Column names of `table` in declaration order
    ///
    /// # Errors
    /// Returns `CrudError::InvalidIdentifier` if the table does not exist.
    pub async fn columns_of(&self, table: &TableName) -> CrudResult<Vec<String>> {
        let schema = self.describe_table(table).await?;
        Ok(schema
            .columns
            .into_iter()
            .map(|c| c.name.as_str().to_string())
            .collect())
    }

    /// The primary key column of `table`, or `None` when the table has no
    /// primary key or a composite one
    ///
    /// # Errors
    /// Returns `CrudError::InvalidIdentifier` if the table does not exist.
    pub async fn primary_key_of(&self, table: &TableName) -> CrudResult<Option<String>> {
        self.ensure_table_exists(table).await?;
        let keys = self.primary_key_columns(table).await?;
        Ok(single_key(table, keys))
    }

    /// Introspect `table` from catalog metadata.
    ///
    /// # Errors
    /// Returns `CrudError::InvalidIdentifier` if the table does not exist or
    /// has a column name that cannot be addressed safely, and
    /// `DbError::SchemaLoadFailed` if a catalog query fails.
    pub async fn describe_table(&self, table: &TableName) -> CrudResult<TableSchema> {
        self.ensure_table_exists(table).await?;

        let rows = self
            .client
            .query(COLUMNS_SQL, &[&table.as_str()])
            .await
            .map_err(schema_load_failed)?;
        let primary_key = single_key(table, self.primary_key_columns(table).await?);

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw_name: String = row.try_get(0).map_err(schema_load_failed)?;
            let type_name: String = row.try_get(1).map_err(schema_load_failed)?;
            let ordinal: i16 = row.try_get(2).map_err(schema_load_failed)?;

            let name = Identifier::parse(&raw_name).map_err(|_| {
                CrudError::InvalidIdentifier(format!(
                    "column '{}' of '{}' is not a plain identifier",
                    raw_name.escape_debug(),
                    table
                ))
            })?;
            let is_primary_key = primary_key.as_deref() == Some(raw_name.as_str());

            columns.push(ColumnDescriptor {
                name,
                data_type: DataType::from_format_type(&type_name),
                is_primary_key,
                ordinal,
            });
        }

        tracing::debug!(table = %table, columns = columns.len(), "described table");
        Ok(TableSchema::new(table.clone(), columns))
    }

    async fn ensure_table_exists(&self, table: &TableName) -> CrudResult<()> {
        let row = self
            .client
            .query_opt(RELKIND_SQL, &[&table.as_str()])
            .await
            .map_err(schema_load_failed)?;
        let relkind: Option<String> = match row {
            Some(row) => row.try_get(0).map_err(schema_load_failed)?,
            None => None,
        };
        match relkind.as_deref() {
            // ordinary and partitioned tables
            Some("r") | Some("p") => Ok(()),
            Some(_) => Err(CrudError::InvalidIdentifier(format!(
                "'{}' is not a table",
                table
            ))),
            None => Err(CrudError::InvalidIdentifier(format!(
                "table '{}' does not exist",
                table
            ))),
        }
    }

    async fn primary_key_columns(&self, table: &TableName) -> CrudResult<Vec<String>> {
        let rows = self
            .client
            .query(PRIMARY_KEY_SQL, &[&table.as_str()])
            .await
            .map_err(schema_load_failed)?;
        rows.iter()
            .map(|row| {
                row.try_get::<_, String>(0)
                    .map_err(|e| CrudError::from(schema_load_failed(e)))
            })
            .collect()
    }
}

fn schema_load_failed(e: tokio_postgres::Error) -> DbError {
    DbError::SchemaLoadFailed(e.to_string())
}

/// Collapse the primary key column list to a single key.
fn single_key(table: &TableName, mut keys: Vec<String>) -> Option<String> {
    match keys.len() {
        0 => None,
        1 => keys.pop(),
        n => {
            tracing::warn!(table = %table, columns = n, "composite primary key is not supported for keyed operations");
            None
        }
    }
}

/// Build a rustls ClientConfig that trusts OS certificates (with Mozilla roots as fallback)
fn make_tls_config() -> rustls::ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    let mut loaded = 0;
    for cert in native_certs.certs {
        if root_store.add(cert).is_ok() {
            loaded += 1;
        }
    }
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}
