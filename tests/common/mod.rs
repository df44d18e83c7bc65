//! Common test utilities and helpers
//!
//! Shared fixture for the integration tests. Every test connects on its
//! own, creates the fixture tables if needed, and works on rows it owns
//! (its own airport codes, its own actor id), so tests can run in parallel.

#![allow(dead_code)]

use airdesk::audit::{ActorId, AuditAction, AuditLogger, AuditQuery};
use airdesk::config::{ConnectionConfig, SslMode};
use airdesk::crud::{CrudEngine, FieldValues};
use airdesk::db::{Identifier, PostgresProvider, SchemaRegistry, TableName};

/// Serializes fixture DDL across concurrently running tests.
const FIXTURE_LOCK: i64 = 0x0a1d_e5c0;

const FIXTURE_SQL: &str = "
CREATE TABLE IF NOT EXISTS airports (
    airport_id serial PRIMARY KEY,
    name text NOT NULL,
    city text,
    country text,
    code varchar(10) NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS terminals (
    terminal_id serial PRIMARY KEY,
    airport_id int NOT NULL REFERENCES airports (airport_id),
    name text NOT NULL,
    opened_at timestamp
);
CREATE TABLE IF NOT EXISTS airport_notes (
    note text,
    written_by int
);
DO $$ BEGIN
    CREATE TYPE flight_status AS ENUM ('Scheduled', 'Delayed', 'Cancelled');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;
CREATE TABLE IF NOT EXISTS flights (
    flight_id serial PRIMARY KEY,
    flight_number varchar(10) NOT NULL UNIQUE,
    status flight_status,
    load_factor real,
    departs_at timestamptz,
    details jsonb
);
";

/// Database connection config from `TEST_DB_*`, defaulting to the local
/// test container.
pub fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        name: "integration-test".to_string(),
        host: std::env::var("TEST_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("TEST_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5433),
        database: std::env::var("TEST_DB_NAME").unwrap_or_else(|_| "test_db".to_string()),
        username: std::env::var("TEST_DB_USER").unwrap_or_else(|_| "test_user".to_string()),
        password: Some(
            std::env::var("TEST_DB_PASSWORD").unwrap_or_else(|_| "test_password".to_string()),
        ),
        ssl_mode: SslMode::Disable,
    }
}

/// Connect, or print why the test is skipped and return `None`.
pub async fn connect() -> Option<PostgresProvider> {
    let config = test_config();
    match PostgresProvider::connect(&config).await {
        Ok(provider) => Some(provider),
        Err(e) => {
            eprintln!(
                "Skipping test: Database not available at {}:{} - {}",
                config.host, config.port, e
            );
            None
        }
    }
}

pub fn table(name: &str) -> TableName {
    Identifier::parse(name).unwrap()
}

/// Create the fixture tables and the audit table.
pub async fn setup_fixture(db: &mut PostgresProvider) {
    let tx = db.transaction().await.unwrap();
    tx.execute("SELECT pg_advisory_xact_lock($1)", &[&FIXTURE_LOCK])
        .await
        .unwrap();
    tx.batch_execute(FIXTURE_SQL).await.unwrap();
    AuditLogger::default().ensure_table(&tx).await.unwrap();
    tx.commit().await.unwrap();
}

/// Connect, set up the fixture and build an engine over the fixture tables.
pub async fn engine() -> Option<(PostgresProvider, CrudEngine)> {
    engine_with(AuditLogger::default()).await
}

/// Like [`engine`], writing audit entries through `audit`.
pub async fn engine_with(audit: AuditLogger) -> Option<(PostgresProvider, CrudEngine)> {
    let mut db = connect().await?;
    setup_fixture(&mut db).await;
    let names = [
        table("airports"),
        table("terminals"),
        table("airport_notes"),
        table("flights"),
    ];
    let registry = SchemaRegistry::load(&db, &names).await.unwrap();
    Some((db, CrudEngine::new(registry, audit)))
}

/// Remove airports with `code` (and their terminals) left over from an
/// earlier run. Bypasses the engine, so nothing is audited.
pub async fn remove_airport(db: &PostgresProvider, code: &str) {
    db.client()
        .execute(
            "DELETE FROM terminals WHERE airport_id IN (SELECT airport_id FROM airports WHERE code = $1)",
            &[&code],
        )
        .await
        .unwrap();
    db.client()
        .execute("DELETE FROM airports WHERE code = $1", &[&code])
        .await
        .unwrap();
}

/// Remove the flight with `number` left over from an earlier run.
pub async fn remove_flight(db: &PostgresProvider, number: &str) {
    db.client()
        .execute("DELETE FROM flights WHERE flight_number = $1", &[&number])
        .await
        .unwrap();
}

/// Rows in `airports` with `code`, read without going through the engine.
pub async fn airports_with_code(db: &PostgresProvider, code: &str) -> i64 {
    db.client()
        .query_one("SELECT count(*) FROM airports WHERE code = $1", &[&code])
        .await
        .unwrap()
        .get(0)
}

pub fn fields(pairs: &[(&str, &str)]) -> FieldValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Audit entries written by `actor` against `table` for `action`.
pub async fn audit_count(
    db: &PostgresProvider,
    actor: ActorId,
    table_name: &str,
    action: AuditAction,
) -> usize {
    let query = AuditQuery {
        table: Some(table(table_name)),
        action: Some(action),
        actor: Some(actor),
        limit: i64::MAX,
    };
    AuditLogger::default()
        .recent(db.client(), &query)
        .await
        .unwrap()
        .len()
}

/// Total audit entries written by `actor`, any table or action.
pub async fn audit_total(db: &PostgresProvider, actor: ActorId) -> usize {
    let query = AuditQuery {
        actor: Some(actor),
        limit: i64::MAX,
        ..AuditQuery::default()
    };
    AuditLogger::default()
        .recent(db.client(), &query)
        .await
        .unwrap()
        .len()
}
