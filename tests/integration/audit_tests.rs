//! Audit log against a live database

use crate::common::{self, fields, table};
use airdesk::audit::{ActorId, AuditAction, AuditLogger, AuditQuery};
use airdesk::error::CrudError;

#[tokio::test]
async fn test_entry_records_actor_and_key() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(92_001);
    common::remove_airport(&db, "TAA").await;

    let id = engine
        .insert(
            &mut db,
            actor,
            &table("airports"),
            &fields(&[("name", "Audited"), ("code", "TAA")]),
        )
        .await
        .unwrap()
        .unwrap();

    let query = AuditQuery {
        table: Some(table("airports")),
        action: Some(AuditAction::Insert),
        actor: Some(actor),
        limit: 1,
    };
    let entries = AuditLogger::default()
        .recent(db.client(), &query)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    let latest = &entries[0];
    assert_eq!(latest.table_name, "airports");
    assert_eq!(latest.action, AuditAction::Insert);
    assert_eq!(latest.record_id.as_deref(), Some(id.as_str()));
    assert_eq!(latest.actor_id, actor);

    common::remove_airport(&db, "TAA").await;
}

#[tokio::test]
async fn test_recent_is_newest_first() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(92_002);
    let airports = table("airports");
    common::remove_airport(&db, "TAB").await;

    let id = engine
        .insert(
            &mut db,
            actor,
            &airports,
            &fields(&[("name", "Ordered"), ("code", "TAB")]),
        )
        .await
        .unwrap()
        .unwrap();
    engine
        .update_by_key(&mut db, actor, &airports, &id, &fields(&[("city", "Later")]))
        .await
        .unwrap();

    let query = AuditQuery {
        actor: Some(actor),
        limit: 2,
        ..AuditQuery::default()
    };
    let entries = AuditLogger::default()
        .recent(db.client(), &query)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, AuditAction::Update);
    assert_eq!(entries[1].action, AuditAction::Insert);
    assert!(entries[0].timestamp >= entries[1].timestamp);

    common::remove_airport(&db, "TAB").await;
}

#[tokio::test]
async fn test_ensure_table_is_repeatable() {
    let Some(mut db) = common::connect().await else {
        return;
    };
    common::setup_fixture(&mut db).await;

    let logger = AuditLogger::default();
    logger.ensure_table(db.client()).await.unwrap();
    logger.ensure_table(db.client()).await.unwrap();
}

#[tokio::test]
async fn test_failed_audit_write_rolls_back_insert() {
    let Some((mut db, engine)) = common::engine_with(AuditLogger::new(table("no_such_audit"))).await
    else {
        return;
    };
    db.client()
        .batch_execute("DROP TABLE IF EXISTS no_such_audit")
        .await
        .unwrap();
    common::remove_airport(&db, "TAR").await;

    let result = engine
        .insert(
            &mut db,
            ActorId(92_003),
            &table("airports"),
            &fields(&[("name", "Unaudited"), ("code", "TAR")]),
        )
        .await;
    assert!(matches!(result, Err(CrudError::Database(_))));
    assert_eq!(common::airports_with_code(&db, "TAR").await, 0);
}

#[tokio::test]
async fn test_failed_audit_write_rolls_back_delete() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let Some((mut unaudited_db, unaudited)) =
        common::engine_with(AuditLogger::new(table("no_such_audit"))).await
    else {
        return;
    };
    common::remove_airport(&db, "TAD").await;

    let id = engine
        .insert(
            &mut db,
            ActorId(92_004),
            &table("airports"),
            &fields(&[("name", "Kept"), ("code", "TAD")]),
        )
        .await
        .unwrap()
        .unwrap();

    let result = unaudited
        .delete_by_key(&mut unaudited_db, ActorId(92_004), &table("airports"), &id)
        .await;
    assert!(matches!(result, Err(CrudError::Database(_))));
    assert_eq!(common::airports_with_code(&db, "TAD").await, 1);

    common::remove_airport(&db, "TAD").await;
}
