//! In-memory persistence collaborator
//!
//! Rows live in per-table vectors (insertion order is the natural order). The
//! backend enforces the same referential rules as the hosted database:
//!
//! | referencing column        | target       | on delete |
//! |---------------------------|--------------|-----------|
//! | `fields.collection_id`    | collections  | cascade   |
//! | `statuses.collection_id`  | collections  | cascade   |
//! | `entries.collection_id`   | collections  | cascade   |
//! | `entries.status_id`       | statuses     | restrict  |
//! | `entry_values.entry_id`   | entries      | cascade   |
//! | `entry_values.field_id`   | fields       | restrict  |
//! | `comments.entry_id`       | entries      | cascade   |
//!
//! and `entry_values` is unique on `(entry_id, field_id)`.
//!
//! Tests can inject a failure for the next operation on a table and can pause
//! writes to observe state while a write is in flight.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use corkboard_api::{StorageEntity, Value};
use corkboard_core::{
    Filter, Join, JoinKind, OrderBy, PersistenceBackend, Query, Result, RowTarget,
    StorageError, Table,
};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use tokio::sync::{RwLock, watch};
use tracing::debug;

/// Operation kinds failures can be injected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Upsert,
    Delete,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnDelete {
    Cascade,
    Restrict,
    SetNull,
}

struct Reference {
    table: Table,
    column: &'static str,
    target: Table,
    on_delete: OnDelete,
}

const REFERENCES: &[Reference] = &[
    Reference {
        table: Table::Fields,
        column: "collection_id",
        target: Table::Collections,
        on_delete: OnDelete::Cascade,
    },
    Reference {
        table: Table::Statuses,
        column: "collection_id",
        target: Table::Collections,
        on_delete: OnDelete::Cascade,
    },
    Reference {
        table: Table::Entries,
        column: "collection_id",
        target: Table::Collections,
        on_delete: OnDelete::Cascade,
    },
    Reference {
        table: Table::Entries,
        column: "status_id",
        target: Table::Statuses,
        on_delete: OnDelete::Restrict,
    },
    Reference {
        table: Table::EntryValues,
        column: "entry_id",
        target: Table::Entries,
        on_delete: OnDelete::Cascade,
    },
    Reference {
        table: Table::EntryValues,
        column: "field_id",
        target: Table::Fields,
        on_delete: OnDelete::Restrict,
    },
    Reference {
        table: Table::Comments,
        column: "entry_id",
        target: Table::Entries,
        on_delete: OnDelete::Cascade,
    },
    Reference {
        table: Table::Documents,
        column: "collection_id",
        target: Table::Collections,
        on_delete: OnDelete::Cascade,
    },
    Reference {
        table: Table::Documents,
        column: "entry_id",
        target: Table::Entries,
        on_delete: OnDelete::SetNull,
    },
];

fn unique_columns(table: Table) -> Option<&'static [&'static str]> {
    match table {
        Table::EntryValues => Some(&["entry_id", "field_id"]),
        _ => None,
    }
}

fn stamps_created_at(table: Table) -> bool {
    matches!(
        table,
        Table::Collections | Table::Entries | Table::Comments | Table::Users | Table::Documents
    )
}

fn stamps_updated_at(table: Table) -> bool {
    matches!(table, Table::Collections | Table::Entries)
}

fn row_id(row: &StorageEntity) -> Option<&str> {
    row.get("id").and_then(Value::as_string)
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a
                .as_string()
                .unwrap_or_default()
                .cmp(b.as_string().unwrap_or_default()),
        },
    }
}

fn sort_rows(rows: &mut [StorageEntity], order_by: &[OrderBy]) {
    rows.sort_by(|a, b| {
        order_by
            .iter()
            .map(|o| {
                let ord = compare_values(
                    a.get(&o.column).unwrap_or(&Value::Null),
                    b.get(&o.column).unwrap_or(&Value::Null),
                );
                if o.descending { ord.reverse() } else { ord }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

struct InjectedFailure {
    table: Table,
    operation: Operation,
    /// Matching calls to let through before failing.
    skip: usize,
    error: StorageError,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<Table, Vec<StorageEntity>>,
    /// Counter for deterministic id generation
    next_id: u64,
    last_stamp: Option<DateTime<Utc>>,
    failures: Vec<InjectedFailure>,
    writes: usize,
}

impl MemoryState {
    fn rows(&self, table: Table) -> &[StorageEntity] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or_default()
    }

    fn rows_mut(&mut self, table: Table) -> &mut Vec<StorageEntity> {
        self.tables.entry(table).or_default()
    }

    fn generate_id(&mut self, table: Table) -> String {
        self.next_id += 1;
        format!("{}_{}", table.as_str(), self.next_id)
    }

    /// Strictly increasing timestamps so `created_at` ordering is deterministic.
    fn stamp(&mut self) -> Value {
        let now = Utc::now();
        let ts = match self.last_stamp {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_stamp = Some(ts);
        Value::String(ts.to_rfc3339())
    }

    fn take_failure(&mut self, table: Table, operation: Operation) -> Result<()> {
        let Some(index) = self
            .failures
            .iter()
            .position(|f| f.table == table && f.operation == operation)
        else {
            return Ok(());
        };
        if self.failures[index].skip > 0 {
            self.failures[index].skip -= 1;
            return Ok(());
        }
        Err(self.failures.remove(index).error)
    }

    fn exists(&self, table: Table, id: &str) -> bool {
        self.rows(table).iter().any(|r| row_id(r) == Some(id))
    }

    fn check_references(&self, table: Table, row: &StorageEntity) -> Result<()> {
        for reference in REFERENCES.iter().filter(|r| r.table == table) {
            if let Some(target_id) = row.get(reference.column).and_then(Value::as_string) {
                if !self.exists(reference.target, target_id) {
                    return Err(StorageError::Backend(format!(
                        "{}.{} references missing {} row {}",
                        table, reference.column, reference.target, target_id
                    )));
                }
            }
        }
        Ok(())
    }

    fn find_conflicting(
        &self,
        table: Table,
        row: &StorageEntity,
        columns: &[&str],
    ) -> Option<usize> {
        if columns.is_empty() {
            return None;
        }
        self.rows(table).iter().position(|existing| {
            columns
                .iter()
                .all(|c| existing.get(*c).is_some_and(|v| Some(v) == row.get(*c)))
        })
    }

    fn insert_row(&mut self, table: Table, mut row: StorageEntity) -> Result<StorageEntity> {
        if !row.get("id").is_some_and(|v| !v.is_null()) {
            let id = self.generate_id(table);
            row.insert("id".to_string(), Value::String(id));
        }
        if stamps_created_at(table) && !row.contains_key("created_at") {
            let ts = self.stamp();
            row.insert("created_at".to_string(), ts);
        }
        if stamps_updated_at(table) {
            let ts = row
                .get("created_at")
                .cloned()
                .unwrap_or_else(|| self.stamp());
            row.entry("updated_at".to_string()).or_insert(ts);
        }
        if let Some(id) = row_id(&row) {
            if self.exists(table, id) {
                return Err(StorageError::UniqueViolation {
                    table: table.to_string(),
                    columns: "id".to_string(),
                });
            }
        }
        if let Some(columns) = unique_columns(table) {
            if self.find_conflicting(table, &row, columns).is_some() {
                return Err(StorageError::UniqueViolation {
                    table: table.to_string(),
                    columns: columns.join(", "),
                });
            }
        }
        self.check_references(table, &row)?;
        self.rows_mut(table).push(row.clone());
        Ok(row)
    }

    fn merge_row(
        &mut self,
        table: Table,
        index: usize,
        patch: &StorageEntity,
    ) -> Result<StorageEntity> {
        let mut merged = self.rows(table)[index].clone();
        for (column, value) in patch {
            if column != "id" {
                merged.insert(column.clone(), value.clone());
            }
        }
        if stamps_updated_at(table) {
            let ts = self.stamp();
            merged.insert("updated_at".to_string(), ts);
        }
        self.check_references(table, &merged)?;
        self.rows_mut(table)[index] = merged.clone();
        Ok(merged)
    }

    fn collect_cascade(&self, table: Table, id: &str, doomed: &mut HashSet<(Table, String)>) {
        if !doomed.insert((table, id.to_string())) {
            return;
        }
        for reference in REFERENCES
            .iter()
            .filter(|r| r.target == table && r.on_delete == OnDelete::Cascade)
        {
            for row in self.rows(reference.table) {
                if row.get(reference.column).and_then(Value::as_string) == Some(id) {
                    if let Some(child) = row_id(row) {
                        self.collect_cascade(reference.table, child, doomed);
                    }
                }
            }
        }
    }

    /// Null out SET NULL references to rows that are being deleted.
    fn detach_references(&mut self, doomed: &HashSet<(Table, String)>) {
        for reference in REFERENCES
            .iter()
            .filter(|r| r.on_delete == OnDelete::SetNull)
        {
            for row in self.rows_mut(reference.table).iter_mut() {
                let dangling = row
                    .get(reference.column)
                    .and_then(Value::as_string)
                    .is_some_and(|target| doomed.contains(&(reference.target, target.to_string())));
                if dangling {
                    row.insert(reference.column.to_string(), Value::Null);
                }
            }
        }
    }

    fn restricting_reference(&self, doomed: &HashSet<(Table, String)>) -> Option<StorageError> {
        for (table, id) in doomed {
            for reference in REFERENCES
                .iter()
                .filter(|r| r.target == *table && r.on_delete == OnDelete::Restrict)
            {
                let blocked = self.rows(reference.table).iter().any(|row| {
                    row.get(reference.column).and_then(Value::as_string) == Some(id.as_str())
                        && !row_id(row)
                            .is_some_and(|rid| doomed.contains(&(reference.table, rid.to_string())))
                });
                if blocked {
                    return Some(StorageError::ForeignKeyConflict {
                        table: table.to_string(),
                        id: id.clone(),
                        referenced_by: reference.table.to_string(),
                    });
                }
            }
        }
        None
    }

    fn attach_join(&self, row: &mut StorageEntity, join: &Join) {
        let mut related: Vec<StorageEntity> = match &join.kind {
            JoinKind::Children { foreign_key } => {
                let parent = row_id(row).unwrap_or_default();
                self.rows(join.table)
                    .iter()
                    .filter(|r| r.get(foreign_key).and_then(Value::as_string) == Some(parent))
                    .cloned()
                    .collect()
            }
            JoinKind::Parent { local_key } => match row.get(local_key).and_then(Value::as_string) {
                Some(target) => self
                    .rows(join.table)
                    .iter()
                    .filter(|r| row_id(r) == Some(target))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            },
        };
        if let Some(order) = &join.order_by {
            sort_rows(&mut related, std::slice::from_ref(order));
        }
        row.insert(
            join.alias.clone(),
            Value::Array(related.into_iter().map(Value::Object).collect()),
        );
    }
}

/// In-memory implementation of [`PersistenceBackend`].
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
    gate: Arc<watch::Sender<bool>>,
    held: Arc<AtomicUsize>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            gate: Arc::new(gate),
            held: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `operation` on `table` fail with `error` without applying it.
    pub async fn fail_next(&self, table: Table, operation: Operation, error: StorageError) {
        self.fail_after(table, operation, 0, error).await;
    }

    /// Let `skip` matching calls succeed, then fail the one after.
    pub async fn fail_after(
        &self,
        table: Table,
        operation: Operation,
        skip: usize,
        error: StorageError,
    ) {
        self.state.write().await.failures.push(InjectedFailure {
            table,
            operation,
            skip,
            error,
        });
    }

    /// Hold every write until [`resume_writes`](Self::resume_writes) is called.
    pub fn pause_writes(&self) {
        self.gate.send_replace(true);
    }

    pub fn resume_writes(&self) {
        self.gate.send_replace(false);
    }

    /// Number of writes currently waiting on a paused gate.
    pub fn held_writes(&self) -> usize {
        self.held.load(AtomicOrdering::SeqCst)
    }

    /// Number of write calls (insert, update, upsert, delete) received so far.
    pub async fn write_count(&self) -> usize {
        self.state.read().await.writes
    }

    /// All rows of a table in insertion order.
    pub async fn rows(&self, table: Table) -> Vec<StorageEntity> {
        self.state.read().await.rows(table).to_vec()
    }

    async fn enter_write(&self) {
        let mut rx = self.gate.subscribe();
        if *rx.borrow() {
            self.held.fetch_add(1, AtomicOrdering::SeqCst);
            let _ = rx.wait_for(|paused| !*paused).await;
            self.held.fetch_sub(1, AtomicOrdering::SeqCst);
        }
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    async fn insert(&self, table: Table, rows: Vec<StorageEntity>) -> Result<Vec<StorageEntity>> {
        self.enter_write().await;
        let mut state = self.state.write().await;
        state.writes += 1;
        state.take_failure(table, Operation::Insert)?;

        // All-or-nothing: validate against a scratch copy of the table first.
        let before = state.rows(table).to_vec();
        let next_id = state.next_id;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            match state.insert_row(table, row) {
                Ok(row) => inserted.push(row),
                Err(e) => {
                    *state.rows_mut(table) = before;
                    state.next_id = next_id;
                    return Err(e);
                }
            }
        }
        debug!("[MemoryBackend] insert {} rows into {}", inserted.len(), table);
        Ok(inserted)
    }

    async fn update(
        &self,
        table: Table,
        target: RowTarget,
        patch: StorageEntity,
    ) -> Result<Vec<StorageEntity>> {
        self.enter_write().await;
        let mut state = self.state.write().await;
        state.writes += 1;
        state.take_failure(table, Operation::Update)?;

        let indices: Vec<usize> = state
            .rows(table)
            .iter()
            .enumerate()
            .filter(|(_, row)| row_id(row).is_some_and(|id| target.contains(id)))
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            if let RowTarget::Id(id) = &target {
                return Err(StorageError::NotFound {
                    table: table.to_string(),
                    id: id.clone(),
                });
            }
        }

        let before = state.rows(table).to_vec();
        let mut updated = Vec::with_capacity(indices.len());
        for index in indices {
            match state.merge_row(table, index, &patch) {
                Ok(row) => updated.push(row),
                Err(e) => {
                    *state.rows_mut(table) = before;
                    return Err(e);
                }
            }
        }
        debug!("[MemoryBackend] update {} rows in {}", updated.len(), table);
        Ok(updated)
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<StorageEntity>,
        conflict_columns: &[&str],
    ) -> Result<Vec<StorageEntity>> {
        self.enter_write().await;
        let mut state = self.state.write().await;
        state.writes += 1;
        state.take_failure(table, Operation::Upsert)?;

        let before = state.rows(table).to_vec();
        let next_id = state.next_id;
        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            let result = match state.find_conflicting(table, &row, conflict_columns) {
                Some(index) => state.merge_row(table, index, &row),
                None => state.insert_row(table, row),
            };
            match result {
                Ok(row) => written.push(row),
                Err(e) => {
                    *state.rows_mut(table) = before;
                    state.next_id = next_id;
                    return Err(e);
                }
            }
        }
        debug!("[MemoryBackend] upsert {} rows into {}", written.len(), table);
        Ok(written)
    }

    async fn delete(&self, table: Table, id: &str) -> Result<()> {
        self.enter_write().await;
        let mut state = self.state.write().await;
        state.writes += 1;
        state.take_failure(table, Operation::Delete)?;

        if !state.exists(table, id) {
            return Err(StorageError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        }
        let mut doomed = HashSet::new();
        state.collect_cascade(table, id, &mut doomed);
        if let Some(conflict) = state.restricting_reference(&doomed) {
            return Err(conflict);
        }
        for rows in state.tables.iter_mut() {
            let (table, rows) = rows;
            rows.retain(|row| {
                !row_id(row).is_some_and(|rid| doomed.contains(&(*table, rid.to_string())))
            });
        }
        state.detach_references(&doomed);
        debug!(
            "[MemoryBackend] delete {} {} ({} rows with cascade)",
            table,
            id,
            doomed.len()
        );
        Ok(())
    }

    async fn query(&self, table: Table, query: Query) -> Result<Vec<StorageEntity>> {
        let mut state = self.state.write().await;
        state.take_failure(table, Operation::Query)?;

        let mut rows: Vec<StorageEntity> = state
            .rows(table)
            .iter()
            .filter(|row| query.filter.as_ref().is_none_or(|f: &Filter| f.matches(row)))
            .cloned()
            .collect();
        sort_rows(&mut rows, &query.order_by);
        for row in rows.iter_mut() {
            for join in &query.joins {
                state.attach_join(row, join);
            }
        }
        Ok(rows)
    }
}
