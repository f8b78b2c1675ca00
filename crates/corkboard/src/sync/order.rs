//! Field and status order surfaces.
//!
//! Both persist order as a dense integer on each row. A move rewrites the order of
//! every row whose position changed, and the rows the backend returns replace the
//! optimistic copies. Field rows that cannot be read are not shown, but they are
//! kept behind the visible fields so no two rows share an order.

use corkboard_api::{CoreError, Field, SchemaError, Status, StorageEntity};
use corkboard_core::{
    OrderChange, Ordered, PersistenceBackend, Reordered, SyncNotice, SyncOutcome, SyncPhase, Table,
    apply_sequence, reorder_ordered,
};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

use super::surface::{Plan, SyncSurface};
use crate::config::SyncConfig;
use crate::schema::{CollectionSchema, UnreadableField, trailing_changes, write_order_changes};

type ReadRow<T> = fn(&StorageEntity) -> Result<T, SchemaError>;

pub type FieldOrderSurface = OrderSurface<Field>;
pub type StatusOrderSurface = OrderSurface<Status>;

/// An ordered list whose `order` column is kept dense under drag reordering.
pub struct OrderSurface<T> {
    surface: SyncSurface<Vec<T>>,
    backend: Arc<dyn PersistenceBackend>,
    table: Table,
    read_row: ReadRow<T>,
    hidden: Arc<Mutex<Vec<UnreadableField>>>,
}

impl<T> Clone for OrderSurface<T> {
    fn clone(&self) -> Self {
        Self {
            surface: self.surface.clone(),
            backend: self.backend.clone(),
            table: self.table,
            read_row: self.read_row,
            hidden: self.hidden.clone(),
        }
    }
}

impl OrderSurface<Field> {
    pub fn open(
        backend: Arc<dyn PersistenceBackend>,
        schema: &CollectionSchema,
        config: &SyncConfig,
    ) -> Self {
        Self::new(
            backend,
            Table::Fields,
            &format!("fields:{}", schema.id()),
            schema.fields.clone(),
            schema.unreadable.clone(),
            Field::from_row,
            config,
        )
    }
}

impl OrderSurface<Status> {
    pub fn open(
        backend: Arc<dyn PersistenceBackend>,
        schema: &CollectionSchema,
        config: &SyncConfig,
    ) -> Self {
        Self::new(
            backend,
            Table::Statuses,
            &format!("statuses:{}", schema.id()),
            schema.statuses.clone(),
            Vec::new(),
            Status::from_row,
            config,
        )
    }
}

impl<T> OrderSurface<T>
where
    T: Ordered + Clone + Send + Sync + 'static,
{
    fn new(
        backend: Arc<dyn PersistenceBackend>,
        table: Table,
        name: &str,
        items: Vec<T>,
        hidden: Vec<UnreadableField>,
        read_row: ReadRow<T>,
        config: &SyncConfig,
    ) -> Self {
        tracing::debug!("[Sync:{}] Opened with {} items", name, items.len());
        Self {
            surface: SyncSurface::new(name, items, config.notice_capacity),
            backend,
            table,
            read_row,
            hidden: Arc::new(Mutex::new(hidden)),
        }
    }

    pub fn name(&self) -> &str {
        self.surface.name()
    }

    pub async fn items(&self) -> Vec<T> {
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

    /// Drag the item at `from` to `to`.
    pub async fn move_item(&self, from: usize, to: usize) -> Result<SyncOutcome, CoreError> {
        self.persist(|items| Ok(reorder_ordered(items, from, to)?)).await
    }

    /// Rearrange the list to match `sequence`, a permutation of the item ids.
    pub async fn apply_sequence(&self, sequence: Vec<String>) -> Result<SyncOutcome, CoreError> {
        self.persist(|items| Ok(apply_sequence(items, &sequence)?)).await
    }

    async fn persist<F>(&self, reorder: F) -> Result<SyncOutcome, CoreError>
    where
        F: FnOnce(&[T]) -> Result<Reordered<T>, CoreError>,
    {
        let backend = self.backend.clone();
        let table = self.table;
        let read_row = self.read_row;
        let hidden = self.hidden.clone();
        self.surface
            .run(
                |items: &Vec<T>| {
                    let reordered = reorder(items.as_slice())?;
                    if reordered.is_unchanged() {
                        return Ok(Plan::NoOp);
                    }
                    Ok(Plan::Remote {
                        next: reordered.items.clone(),
                        change: reordered,
                    })
                },
                |change| write_orders(backend, table, read_row, hidden, change),
            )
            .await
    }
}

/// Write every order change and merge the returned rows into the reordered list.
///
/// Changes are written one row at a time, followed by any hidden rows that have to
/// move behind the visible ones. If one fails, the rows already written are put
/// back to their previous order before the error is returned.
async fn write_orders<T: Ordered>(
    backend: Arc<dyn PersistenceBackend>,
    table: Table,
    read_row: ReadRow<T>,
    hidden: Arc<Mutex<Vec<UnreadableField>>>,
    change: Reordered<T>,
) -> Result<Option<Vec<T>>, CoreError> {
    let mut hidden = hidden.lock().await;
    let mut moved = hidden.clone();
    let visible = change.changes.len();
    let mut changes = change.changes.clone();
    changes.extend(trailing_changes(&mut moved, change.items.len()));
    tracing::debug!(
        "[Sync:{}] Writing {} order changes ({} hidden)",
        table,
        changes.len(),
        changes.len() - visible
    );

    let mut rows = Vec::with_capacity(visible);
    for (written, order) in changes.iter().enumerate() {
        match write_order_changes(backend.as_ref(), table, std::slice::from_ref(order)).await {
            Ok(updated) if written < visible => rows.extend(updated),
            Ok(_) => {}
            Err(error) => {
                restore_orders(backend.as_ref(), table, &changes[..written]).await;
                return Err(error);
            }
        }
    }
    *hidden = moved;

    let mut confirmed = change.items;
    for row in &rows {
        let item = read_row(row)?;
        if let Some(slot) = confirmed.iter_mut().find(|i| i.id() == item.id()) {
            *slot = item;
        }
    }
    confirmed.sort_by_key(|i| i.order());
    Ok(Some(confirmed))
}

async fn restore_orders(backend: &dyn PersistenceBackend, table: Table, written: &[OrderChange]) {
    if written.is_empty() {
        return;
    }
    let reverted: Vec<OrderChange> = written
        .iter()
        .map(|c| OrderChange {
            id: c.id.clone(),
            from: c.to,
            to: c.from,
        })
        .collect();
    if let Err(e) = write_order_changes(backend, table, &reverted).await {
        tracing::warn!(
            "[Sync:{}] Could not restore {} order values: {}",
            table,
            reverted.len(),
            e
        );
    }
}
