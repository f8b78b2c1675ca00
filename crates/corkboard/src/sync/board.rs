//! Card board surface: entries grouped into one column per status.

use corkboard_api::{CoreError, Entry, ValidationError};
use corkboard_core::{
    DragGesture, DropLocation, Group, SyncNotice, SyncOutcome, SyncPhase, move_between_groups,
};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::surface::{Plan, SyncSurface};
use crate::config::SyncConfig;
use crate::records::RecordStore;
use crate::schema::CollectionSchema;

/// Local board state. Columns follow status order; cards keep the order they were
/// loaded in unless moved.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardState {
    pub columns: Vec<Group<String, Entry>>,
    /// Entries whose status matches no column. They cannot be dragged.
    pub unassigned: Vec<Entry>,
}

impl BoardState {
    pub fn new(schema: &CollectionSchema, entries: Vec<Entry>) -> Self {
        let mut columns: Vec<Group<String, Entry>> = schema
            .statuses
            .iter()
            .map(|status| Group {
                key: status.id.clone(),
                items: Vec::new(),
            })
            .collect();
        let mut unassigned = Vec::new();
        for entry in entries {
            let column = entry
                .status_id
                .as_deref()
                .and_then(|id| columns.iter_mut().find(|c| c.key == id));
            match column {
                Some(column) => column.items.push(entry),
                None => unassigned.push(entry),
            }
        }
        Self {
            columns,
            unassigned,
        }
    }

    pub fn column(&self, status_id: &str) -> Option<&[Entry]> {
        self.columns
            .iter()
            .find(|c| c.key == status_id)
            .map(|c| c.items.as_slice())
    }

    /// Status of the column currently showing `entry_id`.
    pub fn entry_status(&self, entry_id: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.items.iter().any(|e| e.id == entry_id))
            .map(|c| c.key.as_str())
    }

    fn locate(&self, entry_id: &str) -> Option<DropLocation<String>> {
        self.columns.iter().find_map(|c| {
            c.items
                .iter()
                .position(|e| e.id == entry_id)
                .map(|index| DropLocation {
                    group: c.key.clone(),
                    index,
                })
        })
    }

    /// All entries, column by column, followed by the unassigned ones.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.columns
            .iter()
            .flat_map(|c| c.items.iter())
            .chain(self.unassigned.iter())
    }
}

/// Optimistic board for one collection. Moving a card across columns persists its
/// new status; moving it within a column is local only.
#[derive(Clone)]
pub struct BoardSurface {
    surface: SyncSurface<BoardState>,
    records: RecordStore,
    schema: Arc<CollectionSchema>,
}

impl BoardSurface {
    pub fn open(
        records: RecordStore,
        schema: Arc<CollectionSchema>,
        entries: Vec<Entry>,
        config: &SyncConfig,
    ) -> Self {
        let name = format!("board:{}", schema.id());
        let state = BoardState::new(&schema, entries);
        tracing::debug!(
            "[Sync:{}] Opened with {} columns, {} unassigned",
            name,
            state.columns.len(),
            state.unassigned.len()
        );
        Self {
            surface: SyncSurface::new(&name, state, config.notice_capacity),
            records,
            schema,
        }
    }

    pub fn name(&self) -> &str {
        self.surface.name()
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub async fn state(&self) -> BoardState {
        self.surface.state().await
    }

    pub async fn phase(&self) -> SyncPhase {
        self.surface.phase().await
    }

    pub async fn is_pending(&self) -> bool {
        self.surface.is_pending().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.surface.subscribe()
    }

    pub async fn close(&self) {
        self.surface.close().await;
    }

    /// Apply a drag gesture between (or within) status columns.
    pub async fn move_card(&self, gesture: DragGesture<String>) -> Result<SyncOutcome, CoreError> {
        self.drag(|_| Ok(gesture)).await
    }

    /// Move an entry to the end of another status column.
    pub async fn move_entry_to(
        &self,
        entry_id: &str,
        status_id: &str,
    ) -> Result<SyncOutcome, CoreError> {
        self.drag(|state| {
            let source = state.locate(entry_id).ok_or_else(|| {
                CoreError::Validation(ValidationError::InvalidGesture {
                    reason: format!("entry {} is not on the board", entry_id),
                })
            })?;
            let column = state.column(status_id).ok_or_else(|| {
                CoreError::Validation(ValidationError::UnknownStatus {
                    status_id: status_id.to_string(),
                })
            })?;
            let destination = if source.group == status_id {
                source.clone()
            } else {
                DropLocation {
                    group: status_id.to_string(),
                    index: column.len(),
                }
            };
            Ok(DragGesture {
                source,
                destination,
            })
        })
        .await
    }

    /// Resolve a gesture against the state it will be applied to, then run it.
    async fn drag<G>(&self, gesture: G) -> Result<SyncOutcome, CoreError>
    where
        G: FnOnce(&BoardState) -> Result<DragGesture<String>, CoreError>,
    {
        let records = self.records.clone();
        let schema = self.schema.clone();
        self.surface
            .run(
                |state: &BoardState| {
                    let gesture = gesture(state)?;
                    let moved = move_between_groups(&state.columns, &gesture)?;
                    if gesture.is_noop() {
                        return Ok(Plan::NoOp);
                    }
                    let next = BoardState {
                        columns: moved.groups,
                        unassigned: state.unassigned.clone(),
                    };
                    Ok(match moved.membership {
                        None => Plan::Local(next),
                        Some(change) => Plan::Remote { next, change },
                    })
                },
                |change| async move {
                    records
                        .update_entry_status(&schema, &change.item_id, &change.to_group)
                        .await
                        .map(|_| None)
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::NewEntry;
    use crate::schema::{NewCollection, NewField, NewStatus, SchemaService};
    use crate::session::Session;
    use crate::storage::{MemoryBackend, MemoryFileStorage, Operation};
    use corkboard_api::{FieldType, ViewType};
    use corkboard_core::{PersistenceBackend, StorageError, Table};

    async fn board() -> (MemoryBackend, BoardSurface, Vec<String>) {
        let backend = MemoryBackend::new();
        let shared: Arc<dyn PersistenceBackend> = Arc::new(backend.clone());
        let schema_service = SchemaService::new(shared.clone());
        let records = RecordStore::new(
            shared,
            Arc::new(MemoryFileStorage::new(&Default::default())),
        );
        let session = Session::authenticated("user-1");
        let collection = schema_service
            .create_collection(
                &session,
                NewCollection {
                    name: "Chores".into(),
                    description: None,
                    icon: "🧹".into(),
                    view_type: ViewType::Board,
                    fields: vec![NewField::new("Title", FieldType::Text)],
                    statuses: vec![NewStatus::new("New", "#ccc"), NewStatus::new("Done", "#0c0")],
                },
            )
            .await
            .unwrap();
        let schema = schema_service.load_collection(collection.id()).await.unwrap();
        let title = schema.fields[0].id.clone();
        let new = schema.statuses[0].id.clone();
        let done = schema.statuses[1].id.clone();
        for name in ["one", "two"] {
            records
                .create_entry(&session, &schema, NewEntry::new(Some(&new)).value(&title, name))
                .await
                .unwrap();
        }
        let entries = records.list_entries(schema.id()).await.unwrap();
        let surface =
            BoardSurface::open(records, Arc::new(schema), entries, &SyncConfig::default());
        (backend, surface, vec![new, done])
    }

    #[tokio::test]
    async fn test_in_column_move_is_local() {
        let (backend, surface, statuses) = board().await;
        let writes = backend.write_count().await;
        let outcome = surface
            .move_card(DragGesture::between(statuses[0].clone(), 0, statuses[0].clone(), 1))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::LocalOnly);
        assert_eq!(backend.write_count().await, writes);
    }

    #[tokio::test]
    async fn test_move_entry_to_failure_rolls_back() {
        let (backend, surface, statuses) = board().await;
        let before = surface.state().await;
        let entry_id = before.columns[0].items[0].id.clone();
        backend
            .fail_next(
                Table::Entries,
                Operation::Update,
                StorageError::Transport("offline".into()),
            )
            .await;

        let err = surface.move_entry_to(&entry_id, &statuses[1]).await.unwrap_err();
        assert!(matches!(err, CoreError::Transport { .. }));
        assert_eq!(surface.state().await, before);

        let outcome = surface.move_entry_to(&entry_id, &statuses[1]).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Committed);
        let state = surface.state().await;
        assert_eq!(state.entry_status(&entry_id), Some(statuses[1].as_str()));
        assert_eq!(
            state.column(&statuses[1]).unwrap()[0].status_id.as_deref(),
            Some(statuses[1].as_str())
        );
    }

    #[tokio::test]
    async fn test_move_entry_to_uses_position_after_local_reorder() {
        let (backend, surface, statuses) = board().await;
        let before = surface.state().await;
        let first = before.columns[0].items[0].id.clone();
        let second = before.columns[0].items[1].id.clone();
        let other = surface.clone();
        other
            .move_card(DragGesture::between(statuses[0].clone(), 1, statuses[0].clone(), 0))
            .await
            .unwrap();

        let writes = backend.write_count().await;
        let outcome = surface.move_entry_to(&first, &statuses[1]).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Committed);
        assert_eq!(backend.write_count().await, writes + 1);

        let state = surface.state().await;
        assert_eq!(state.entry_status(&first), Some(statuses[1].as_str()));
        assert_eq!(state.entry_status(&second), Some(statuses[0].as_str()));
        let remaining: Vec<&str> = state
            .column(&statuses[0])
            .unwrap()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(remaining, vec![second.as_str()]);
    }
}
