//! Integration tests for PostgresProvider introspection
//!
//! These tests require the test PostgreSQL database to be running.
//! Start it with: docker-compose -f docker-compose.test.yml up -d

use crate::common::{self, table};
use airdesk::error::CrudError;

#[tokio::test]
async fn test_connect_to_database() {
    let Some(db) = common::connect().await else {
        return;
    };
    assert!(db.is_connected());
}

#[tokio::test]
async fn test_columns_in_declaration_order() {
    let Some(mut db) = common::connect().await else {
        return;
    };
    common::setup_fixture(&mut db).await;

    let columns = db.columns_of(&table("airports")).await.unwrap();
    assert_eq!(columns, vec!["airport_id", "name", "city", "country", "code"]);
}

#[tokio::test]
async fn test_primary_key_lookup() {
    let Some(mut db) = common::connect().await else {
        return;
    };
    common::setup_fixture(&mut db).await;

    assert_eq!(
        db.primary_key_of(&table("terminals")).await.unwrap().as_deref(),
        Some("terminal_id")
    );
    assert_eq!(db.primary_key_of(&table("airport_notes")).await.unwrap(), None);
}

#[tokio::test]
async fn test_describe_table_types() {
    let Some(mut db) = common::connect().await else {
        return;
    };
    common::setup_fixture(&mut db).await;

    let schema = db.describe_table(&table("terminals")).await.unwrap();
    let pk = schema.primary_key().unwrap();
    assert_eq!(pk.name.as_str(), "terminal_id");
    assert_eq!(pk.ordinal, 1);

    let opened = schema.column("opened_at").unwrap();
    assert_eq!(opened.data_type, airdesk::db::DataType::Timestamp);
    assert!(!opened.is_primary_key);
}

#[tokio::test]
async fn test_unknown_table_is_invalid_identifier() {
    let Some(db) = common::connect().await else {
        return;
    };

    let result = db.columns_of(&table("no_such_table_xyz")).await;
    assert!(matches!(result, Err(CrudError::InvalidIdentifier(_))));

    let result = db.primary_key_of(&table("no_such_table_xyz")).await;
    assert!(matches!(result, Err(CrudError::InvalidIdentifier(_))));
}

#[tokio::test]
async fn test_view_is_not_a_table() {
    let Some(db) = common::connect().await else {
        return;
    };

    // pg_tables is a view in every database
    let result = db.describe_table(&table("pg_tables")).await;
    assert!(matches!(result, Err(CrudError::InvalidIdentifier(msg)) if msg.contains("not a table")));
}
