//! Walks through a board session against the in-memory collaborators.
//!
//! Usage: cargo run --example board_demo [config.yaml]

use anyhow::Result;
use corkboard::storage::Operation;
use corkboard::{
    Corkboard, CorkboardConfig, NewCollection, NewEntry, NewField, NewStatus, Session, logging,
};
use corkboard_api::{FieldType, ViewType};
use corkboard_core::{StorageError, Table};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => CorkboardConfig::load_from_file(Path::new(&path))?,
        None => CorkboardConfig::default(),
    };
    logging::init(&config.logging);

    let (engine, backend) = Corkboard::in_memory(config);
    let session = Session::authenticated("demo-user");

    let schema = engine
        .schema()
        .create_collection(
            &session,
            NewCollection {
                name: "Chores".into(),
                description: None,
                icon: "🧹".into(),
                view_type: ViewType::Board,
                fields: vec![
                    NewField::new("Title", FieldType::Text),
                    NewField::new("Priority", FieldType::Select).with_options(&["Low", "High"]),
                ],
                statuses: vec![NewStatus::new("New", "#94a3b8"), NewStatus::new("Done", "#22c55e")],
            },
        )
        .await?;
    let new = schema.statuses[0].id.clone();
    let done = schema.statuses[1].id.clone();
    let entry = engine
        .records()
        .create_entry(
            &session,
            &schema,
            NewEntry::new(Some(&new))
                .value(&schema.fields[0].id, "Fix sink")
                .value(&schema.fields[1].id, "High"),
        )
        .await?;

    let board = engine.open_board(Arc::new(schema.clone())).await?;
    let mut notices = board.subscribe();

    backend
        .fail_next(
            Table::Entries,
            Operation::Update,
            StorageError::Transport("simulated outage".into()),
        )
        .await;
    if let Err(e) = board.move_entry_to(&entry.id, &done).await {
        println!("move rejected: {}", e);
    }
    if let Ok(notice) = notices.try_recv() {
        println!("notice on {}: {}", notice.surface, notice.message);
    }
    println!("after rollback: {:?}", board.move_entry_to(&entry.id, &done).await?);

    for column in engine.board_view(&schema).await?.columns {
        let titles: Vec<&str> = column.cards.iter().map(|c| c.title.as_str()).collect();
        println!("{:>6}: {:?}", column.status.name, titles);
    }
    Ok(())
}
