//! CRUD engine against a live database
//!
//! Each test uses its own airport codes and actor id.

use crate::common::{self, audit_count, audit_total, fields, table};
use airdesk::audit::{ActorId, AuditAction};
use airdesk::crud::sql::Page;
use airdesk::crud::{FieldValues, ListQuery};
use airdesk::error::{ConstraintKind, CrudError};

fn filtered(filter: &str) -> ListQuery {
    ListQuery {
        filter: Some(filter.to_string()),
        page: None,
    }
}

#[tokio::test]
async fn test_airport_lifecycle() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_001);
    let airports = table("airports");
    common::remove_airport(&db, "TST").await;
    let inserts_before = audit_count(&db, actor, "airports", AuditAction::Insert).await;
    let updates_before = audit_count(&db, actor, "airports", AuditAction::Update).await;
    let deletes_before = audit_count(&db, actor, "airports", AuditAction::Delete).await;

    let id = engine
        .insert(
            &mut db,
            actor,
            &airports,
            &fields(&[("name", "Test Intl"), ("city", "Testville"), ("code", "TST")]),
        )
        .await
        .unwrap()
        .expect("airports has a primary key");

    let rows = engine.list(&db, &airports, &filtered("TST")).await.unwrap();
    let row = rows
        .iter()
        .find(|r| r.text("airport_id") == Some(id.as_str()))
        .expect("inserted airport is listed");
    assert_eq!(row.text("name"), Some("Test Intl"));
    assert!(row.is_null("country"));

    let outcome = engine
        .update_by_key(&mut db, actor, &airports, &id, &fields(&[("code", "TSX")]))
        .await
        .unwrap();
    assert_eq!(outcome.before.text("code"), Some("TST"));
    assert_eq!(outcome.after.text("code"), Some("TSX"));
    assert_eq!(outcome.changed_columns(), vec!["code"]);

    let removed = engine
        .delete_by_key(&mut db, actor, &airports, &id)
        .await
        .unwrap();
    assert_eq!(removed.text("code"), Some("TSX"));

    let result = engine.fetch(&db, &airports, &id).await;
    assert!(matches!(result, Err(CrudError::RecordNotFound { .. })));

    assert_eq!(
        audit_count(&db, actor, "airports", AuditAction::Insert).await,
        inserts_before + 1
    );
    assert_eq!(
        audit_count(&db, actor, "airports", AuditAction::Update).await,
        updates_before + 1
    );
    assert_eq!(
        audit_count(&db, actor, "airports", AuditAction::Delete).await,
        deletes_before + 1
    );
}

#[tokio::test]
async fn test_inserted_values_read_back_verbatim() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_002);
    common::remove_airport(&db, "TSV").await;

    let airport_id = engine
        .insert(
            &mut db,
            actor,
            &table("airports"),
            &fields(&[("name", "Verbatim Field"), ("code", "TSV")]),
        )
        .await
        .unwrap()
        .unwrap();

    let terminals = table("terminals");
    let terminal_id = engine
        .insert(
            &mut db,
            actor,
            &terminals,
            &fields(&[
                ("airport_id", airport_id.as_str()),
                ("name", "T1  (north) "),
                ("opened_at", "2024-05-01 08:30:00"),
            ]),
        )
        .await
        .unwrap()
        .unwrap();

    let row = engine.fetch(&db, &terminals, &terminal_id).await.unwrap();
    assert_eq!(row.text("name"), Some("T1  (north) "));
    assert_eq!(row.text("opened_at"), Some("2024-05-01 08:30:00"));
    assert_eq!(row.text("airport_id"), Some(airport_id.as_str()));

    // What was shown can be submitted back unchanged
    let shown = row.text("opened_at").unwrap().to_string();
    let outcome = engine
        .update_by_key(
            &mut db,
            actor,
            &terminals,
            &terminal_id,
            &fields(&[("opened_at", shown.as_str())]),
        )
        .await
        .unwrap();
    assert!(outcome.changed_columns().is_empty());

    common::remove_airport(&db, "TSV").await;
}

#[tokio::test]
async fn test_update_is_idempotent() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_003);
    let airports = table("airports");
    common::remove_airport(&db, "TSI").await;

    let id = engine
        .insert(
            &mut db,
            actor,
            &airports,
            &fields(&[("name", "Idem"), ("code", "TSI")]),
        )
        .await
        .unwrap()
        .unwrap();

    let change = fields(&[("city", "Twice")]);
    let first = engine
        .update_by_key(&mut db, actor, &airports, &id, &change)
        .await
        .unwrap();
    let second = engine
        .update_by_key(&mut db, actor, &airports, &id, &change)
        .await
        .unwrap();
    assert_eq!(first.after, second.after);
    assert_eq!(second.before, second.after);

    common::remove_airport(&db, "TSI").await;
}

#[tokio::test]
async fn test_empty_update_writes_nothing() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_004);
    let airports = table("airports");
    common::remove_airport(&db, "TSE").await;

    let id = engine
        .insert(
            &mut db,
            actor,
            &airports,
            &fields(&[("name", "Empty"), ("code", "TSE")]),
        )
        .await
        .unwrap()
        .unwrap();
    let before = audit_total(&db, actor).await;

    let outcome = engine
        .update_by_key(&mut db, actor, &airports, &id, &FieldValues::new())
        .await
        .unwrap();
    assert_eq!(outcome.before, outcome.after);
    assert_eq!(audit_total(&db, actor).await, before);

    common::remove_airport(&db, "TSE").await;
}

#[tokio::test]
async fn test_referenced_airport_cannot_be_deleted() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_005);
    let airports = table("airports");
    common::remove_airport(&db, "TSF").await;

    let airport_id = engine
        .insert(
            &mut db,
            actor,
            &airports,
            &fields(&[("name", "Referenced"), ("code", "TSF")]),
        )
        .await
        .unwrap()
        .unwrap();
    engine
        .insert(
            &mut db,
            actor,
            &table("terminals"),
            &fields(&[("airport_id", airport_id.as_str()), ("name", "A")]),
        )
        .await
        .unwrap();
    let deletes_before = audit_count(&db, actor, "airports", AuditAction::Delete).await;

    let result = engine
        .delete_by_key(&mut db, actor, &airports, &airport_id)
        .await;
    match result {
        Err(CrudError::ConstraintViolation { kind, message, .. }) => {
            assert_eq!(kind, ConstraintKind::ForeignKey);
            assert!(message.contains("terminals"), "message: {}", message);
        }
        other => panic!("expected a foreign key violation, got {:?}", other),
    }

    assert!(engine.fetch(&db, &airports, &airport_id).await.is_ok());
    assert_eq!(
        audit_count(&db, actor, "airports", AuditAction::Delete).await,
        deletes_before
    );

    common::remove_airport(&db, "TSF").await;
}

#[tokio::test]
async fn test_unique_violation_rolls_back() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_006);
    let airports = table("airports");
    common::remove_airport(&db, "TSU").await;

    engine
        .insert(
            &mut db,
            actor,
            &airports,
            &fields(&[("name", "First"), ("code", "TSU")]),
        )
        .await
        .unwrap();
    let before = audit_total(&db, actor).await;

    let result = engine
        .insert(
            &mut db,
            actor,
            &airports,
            &fields(&[("name", "Second"), ("code", "TSU")]),
        )
        .await;
    assert!(matches!(
        result,
        Err(CrudError::ConstraintViolation {
            kind: ConstraintKind::Unique,
            ..
        })
    ));
    assert_eq!(audit_total(&db, actor).await, before);

    let rows = engine.list(&db, &airports, &filtered("TSU")).await.unwrap();
    assert_eq!(rows.len(), 1);

    common::remove_airport(&db, "TSU").await;
}

#[tokio::test]
async fn test_unknown_field_is_rejected_without_write() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_007);
    let airports = table("airports");
    common::remove_airport(&db, "TSN").await;
    let before = audit_total(&db, actor).await;

    let result = engine
        .insert(
            &mut db,
            actor,
            &airports,
            &fields(&[("name", "Nope"), ("code", "TSN"), ("password_hash", "x")]),
        )
        .await;
    assert!(matches!(result, Err(CrudError::InvalidIdentifier(_))));

    let rows = engine.list(&db, &airports, &filtered("TSN")).await.unwrap();
    assert!(rows.is_empty());
    assert_eq!(audit_total(&db, actor).await, before);
}

#[tokio::test]
async fn test_invalid_values_are_reported_per_field() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_008);

    let result = engine
        .insert(
            &mut db,
            actor,
            &table("terminals"),
            &fields(&[
                ("airport_id", "first"),
                ("name", "T9"),
                ("opened_at", "yesterday"),
            ]),
        )
        .await;
    match result {
        Err(CrudError::InvalidFieldValue(errors)) => {
            let columns: Vec<_> = errors.iter().map(|e| e.column.as_str()).collect();
            assert_eq!(columns, vec!["airport_id", "opened_at"]);
        }
        other => panic!("expected invalid field values, got {:?}", other),
    }
}

#[tokio::test]
async fn test_table_without_primary_key() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_009);
    let notes = table("airport_notes");
    let before = audit_count(&db, actor, "airport_notes", AuditAction::Insert).await;

    let id = engine
        .insert(&mut db, actor, &notes, &fields(&[("note", "no key here")]))
        .await
        .unwrap();
    assert_eq!(id, None);
    assert_eq!(
        audit_count(&db, actor, "airport_notes", AuditAction::Insert).await,
        before + 1
    );

    let result = engine
        .update_by_key(&mut db, actor, &notes, "1", &fields(&[("note", "x")]))
        .await;
    assert!(matches!(result, Err(CrudError::NoPrimaryKey(_))));

    let result = engine.delete_by_key(&mut db, actor, &notes, "1").await;
    assert!(matches!(result, Err(CrudError::NoPrimaryKey(_))));
}

#[tokio::test]
async fn test_missing_record() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_010);
    let airports = table("airports");
    let before = audit_total(&db, actor).await;

    let result = engine
        .update_by_key(&mut db, actor, &airports, "-1", &fields(&[("city", "Nowhere")]))
        .await;
    assert!(matches!(result, Err(CrudError::RecordNotFound { .. })));

    let result = engine.delete_by_key(&mut db, actor, &airports, "-1").await;
    assert!(matches!(result, Err(CrudError::RecordNotFound { .. })));

    assert_eq!(audit_total(&db, actor).await, before);
}

#[tokio::test]
async fn test_unmanaged_table_is_rejected() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };

    let result = engine
        .insert(
            &mut db,
            ActorId(91_011),
            &table("audit_logs"),
            &fields(&[("action", "DELETE")]),
        )
        .await;
    assert!(matches!(result, Err(CrudError::InvalidIdentifier(_))));
}

#[tokio::test]
async fn test_filter_and_paging() {
    let Some((mut db, engine)) = common::engine().await else {
        return;
    };
    let actor = ActorId(91_012);
    let airports = table("airports");
    let codes = ["TP1", "TP2", "TP3"];
    for code in codes {
        common::remove_airport(&db, code).await;
    }
    for code in codes {
        engine
            .insert(
                &mut db,
                actor,
                &airports,
                &fields(&[("name", "Paging 100%_match"), ("code", code)]),
            )
            .await
            .unwrap();
    }

    // '%' and '_' in the filter match literally
    let total = engine
        .count(&db, &airports, Some("100%_MATCH"))
        .await
        .unwrap();
    assert_eq!(total, 3);

    let query = ListQuery {
        filter: Some("100%_match".to_string()),
        page: Some(Page::new(2, 2)),
    };
    let page = engine.list(&db, &airports, &query).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].text("code"), Some("TP3"));

    for code in codes {
        common::remove_airport(&db, code).await;
    }
}
