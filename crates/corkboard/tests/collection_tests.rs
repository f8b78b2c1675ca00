mod common;

use anyhow::Result;
use common::{Fixture, field_id, status_id};
use corkboard::projections::CalendarProjection;
use corkboard::{NewDocument, NewEntry, NewField, Session, ValueMap};
use corkboard_api::{FieldType, Value};
use corkboard_core::{PersistenceBackend, Table, is_dense};
use std::collections::HashMap;

#[tokio::test]
async fn test_removing_field_clears_its_values() -> Result<()> {
    let fx = Fixture::new();
    let mut schema = fx.chores().await?;
    let new = status_id(&schema, "New");
    let priority = field_id(&schema, "Priority");
    let entry = fx
        .engine
        .records()
        .create_entry(
            &fx.session,
            &schema,
            NewEntry::new(Some(&new))
                .value(&field_id(&schema, "Title"), "Fix sink")
                .value(&priority, "Low"),
        )
        .await?;

    fx.engine.schema().remove_field(&mut schema, &priority).await?;

    let stored = fx.engine.records().get_entry(&entry.id).await?;
    assert_eq!(stored.values.len(), 1);
    assert_eq!(stored.value_of(&priority), None);
    assert!(is_dense(&schema.fields));
    let reloaded = fx.engine.schema().load_collection(schema.id()).await?;
    assert_eq!(reloaded.fields, schema.fields);
    Ok(())
}

#[tokio::test]
async fn test_collections_are_listed_per_owner_and_deleted_with_contents() -> Result<()> {
    let fx = Fixture::new();
    let chores = fx.chores().await?;
    let reading = fx.with_fields(&["Book"]).await?;
    let other = Session::authenticated("user-2");

    let mine = fx.engine.schema().list_collections(&fx.session).await?;
    let names: Vec<&str> = mine.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Reading list", "Chores"]);
    assert!(fx.engine.schema().list_collections(&other).await?.is_empty());

    fx.engine
        .records()
        .create_entry(
            &fx.session,
            &chores,
            NewEntry::new(Some(&status_id(&chores, "New")))
                .value(&field_id(&chores, "Title"), "Mop"),
        )
        .await?;
    fx.engine.schema().delete_collection(chores.id()).await?;

    assert!(fx.backend.rows(Table::Entries).await.is_empty());
    assert!(fx.backend.rows(Table::EntryValues).await.is_empty());
    assert!(fx.backend.rows(Table::Statuses).await.is_empty());
    assert_eq!(fx.backend.rows(Table::Fields).await.len(), reading.fields.len());
    Ok(())
}

#[tokio::test]
async fn test_views_render_entries() -> Result<()> {
    let fx = Fixture::new();
    let mut schema = fx.chores().await?;
    let due = fx
        .engine
        .schema()
        .add_field(&mut schema, NewField::new("Due", FieldType::Date))
        .await?;
    let new = status_id(&schema, "New");
    let title = field_id(&schema, "Title");

    let entry = fx
        .engine
        .records()
        .create_entry(
            &fx.session,
            &schema,
            NewEntry::new(Some(&new)).value(&title, "Fix sink"),
        )
        .await?;
    let values: ValueMap = HashMap::from([(due.id.clone(), Some("2024-03-09".to_string()))]);
    fx.engine
        .records()
        .update_entry_values(&schema, &entry.id, &values)
        .await?;

    let board = fx.engine.board_view(&schema).await?;
    assert_eq!(board.columns.len(), 2);
    assert_eq!(board.columns[0].cards[0].title, "Fix sink");

    let table = fx.engine.table_view(&schema).await?;
    assert_eq!(table.rows[0].cells, vec!["Fix sink", "-", "2024-03-09"]);
    assert!(table.issues.is_empty());

    let calendar = fx.engine.calendar_view(&schema).await?;
    match &calendar {
        CalendarProjection::Events { field_id, events, .. } => {
            assert_eq!(field_id, &due.id);
            assert_eq!(events[0].date_key, "2024-03-09");
            assert_eq!(events[0].title, "Fix sink");
        }
        CalendarProjection::NoDateField => panic!("collection has a date field"),
    }
    Ok(())
}

#[tokio::test]
async fn test_comments_carry_author_profile() -> Result<()> {
    let fx = Fixture::new();
    let schema = fx.chores().await?;
    fx.backend
        .insert(
            Table::Users,
            vec![HashMap::from([
                ("id".to_string(), Value::from("user-1")),
                ("email".to_string(), Value::from("sam@example.com")),
                ("name".to_string(), Value::from("Sam")),
            ])],
        )
        .await?;
    let entry = fx
        .engine
        .records()
        .create_entry(
            &fx.session,
            &schema,
            NewEntry::new(Some(&status_id(&schema, "New")))
                .value(&field_id(&schema, "Title"), "Paint fence"),
        )
        .await?;

    fx.engine
        .records()
        .add_comment(&fx.session, &entry.id, "  first coat done ")
        .await?;
    fx.engine
        .records()
        .add_comment(&fx.session, &entry.id, "second coat done")
        .await?;

    let comments = fx.engine.records().list_comments(&entry.id).await?;
    let contents: Vec<&str> = comments.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["first coat done", "second coat done"]);
    assert_eq!(
        comments[0].user.as_ref().map(|u| u.name.as_str()),
        Some("Sam")
    );

    fx.engine.records().delete_entry(&entry.id).await?;
    assert!(fx.backend.rows(Table::Comments).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_documents_follow_their_collection() -> Result<()> {
    let fx = Fixture::new();
    let chores = fx.chores().await?;
    let entry = fx
        .engine
        .records()
        .create_entry(
            &fx.session,
            &chores,
            NewEntry::new(Some(&status_id(&chores, "New")))
                .value(&field_id(&chores, "Title"), "Fix sink"),
        )
        .await?;

    let manual = fx
        .engine
        .documents()
        .upload(
            &fx.session,
            chores.id(),
            Some(entry.id.as_str()),
            NewDocument::new("sink-manual.pdf", "application/pdf", b"%PDF-1.7".to_vec()),
        )
        .await?;
    assert!(manual.storage_path.starts_with("collection_documents/"));
    assert_eq!(
        fx.engine.documents().list_for_entry(chores.id(), &entry.id).await?,
        vec![manual]
    );

    fx.engine.schema().delete_collection(chores.id()).await?;
    assert!(fx.backend.rows(Table::Documents).await.is_empty());
    Ok(())
}
