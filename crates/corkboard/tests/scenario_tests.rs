mod common;

use anyhow::Result;
use common::{Fixture, field_id, status_id};
use corkboard::storage::Operation;
use corkboard::{CoreError, ErrorKind, NewEntry, SyncOutcome, SyncPhase};
use corkboard_core::{StorageError, Table, is_dense};
use std::sync::Arc;

#[tokio::test]
async fn test_create_entry_with_values_under_status() -> Result<()> {
    let fx = Fixture::new();
    let schema = fx.chores().await?;
    let new = status_id(&schema, "New");

    let entry = fx
        .engine
        .records()
        .create_entry(
            &fx.session,
            &schema,
            NewEntry::new(Some(&new))
                .value(&field_id(&schema, "Title"), "Fix sink")
                .value(&field_id(&schema, "Priority"), "High"),
        )
        .await?;

    assert_eq!(entry.values.len(), 2);
    assert_eq!(entry.status_id.as_deref(), Some(new.as_str()));
    assert_eq!(entry.value_of(&field_id(&schema, "Title")), Some("Fix sink"));
    assert_eq!(fx.backend.rows(Table::EntryValues).await.len(), 2);

    let stored = fx.engine.records().get_entry(&entry.id).await?;
    assert_eq!(stored.values.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_rejected_drag_returns_card_to_original_column() -> Result<()> {
    let fx = Fixture::new();
    let schema = Arc::new(fx.chores().await?);
    let new = status_id(&schema, "New");
    let done = status_id(&schema, "Done");
    let entry = fx
        .engine
        .records()
        .create_entry(
            &fx.session,
            &schema,
            NewEntry::new(Some(&new))
                .value(&field_id(&schema, "Title"), "Fix sink")
                .value(&field_id(&schema, "Priority"), "High"),
        )
        .await?;

    let board = fx.engine.open_board(schema.clone()).await?;
    let mut notices = board.subscribe();
    let before = board.state().await;

    fx.backend.pause_writes();
    fx.backend
        .fail_next(
            Table::Entries,
            Operation::Update,
            StorageError::Transport("connection reset".into()),
        )
        .await;

    let (result, optimistic) = futures::join!(board.move_entry_to(&entry.id, &done), async {
        while fx.backend.held_writes() == 0 {
            tokio::task::yield_now().await;
        }
        let optimistic = board.state().await;
        fx.backend.resume_writes();
        optimistic
    });

    // Shown under Done while the write was in flight.
    assert_eq!(optimistic.entry_status(&entry.id), Some(done.as_str()));
    assert!(optimistic.column(&new).is_some_and(|c| c.is_empty()));

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert_eq!(board.state().await, before);
    assert_eq!(board.phase().await, SyncPhase::RolledBack);

    let notice = notices.try_recv()?;
    assert_eq!(notice.surface, board.name());
    assert_eq!(notice.kind, ErrorKind::TransportFailure);

    let stored = fx.engine.records().get_entry(&entry.id).await?;
    assert_eq!(stored.status_id.as_deref(), Some(new.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_moving_last_field_to_front_rewrites_all_orders() -> Result<()> {
    let fx = Fixture::new();
    let schema = fx.with_fields(&["A", "B", "C"]).await?;
    let surface = fx.engine.open_field_order(&schema);

    let writes = fx.backend.write_count().await;
    let outcome = surface.move_item(2, 0).await?;
    assert_eq!(outcome, SyncOutcome::Committed);

    let items = surface.items().await;
    let names: Vec<&str> = items.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["C", "A", "B"]);
    let orders: Vec<i64> = items.iter().map(|f| f.order).collect();
    assert_eq!(orders, vec![0, 1, 2]);
    assert!(is_dense(&items));
    // All three indices shifted, so all three rows are re-sent.
    assert_eq!(fx.backend.write_count().await - writes, 3);

    let reloaded = fx.engine.schema().load_collection(schema.id()).await?;
    let names: Vec<&str> = reloaded.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["C", "A", "B"]);
    Ok(())
}

#[tokio::test]
async fn test_title_field_cannot_be_deleted() -> Result<()> {
    let fx = Fixture::new();
    let mut schema = fx.chores().await?;
    let before = schema.clone();
    let title = field_id(&schema, "Title");

    let err = fx
        .engine
        .schema()
        .remove_field(&mut schema, &title)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ProtectedField { .. }));
    assert_eq!(schema, before);
    let reloaded = fx.engine.schema().load_collection(schema.id()).await?;
    assert_eq!(reloaded.fields, before.fields);
    Ok(())
}
