//! Schema model
//!
//! [`CollectionSchema`] is the locally held shape of one collection: its fields and
//! statuses sorted by `order`. [`SchemaService`] performs schema changes against the
//! persistence collaborator and updates the local schema once the write succeeded.

use chrono::Utc;
use corkboard_api::{
    Collection, CoreError, Field, FieldType, FormField, NamedKind, SchemaError, Status,
    StorageEntity, ValidationError, Value, ViewType, model::form_definition_value,
};
use corkboard_core::{
    Filter, Join, OrderBy, OrderChange, PersistenceBackend, Query, RowTarget, StorageError,
    Table, apply_sequence, densify,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::session::Session;

type Result<T> = std::result::Result<T, CoreError>;

const STATUS_IN_USE: &str = "Cannot delete status: Entries are currently assigned to it.";

#[derive(Debug, Clone, PartialEq)]
pub struct NewField {
    pub name: String,
    pub field_type: FieldType,
    pub options: Vec<String>,
    pub required: bool,
}

impl NewField {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            options: Vec::new(),
            required: false,
        }
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStatus {
    pub name: String,
    pub color: String,
}

impl NewStatus {
    pub fn new(name: &str, color: &str) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCollection {
    pub name: String,
    pub description: Option<String>,
    pub icon: String,
    pub view_type: ViewType,
    pub fields: Vec<NewField>,
    pub statuses: Vec<NewStatus>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPatch {
    pub name: Option<String>,
    pub field_type: Option<FieldType>,
    pub options: Option<Vec<String>>,
    pub required: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// A field row that could not be read as a [`Field`]. It is hidden from every view
/// but still takes up its name and its place in the field order.
#[derive(Debug, Clone, PartialEq)]
pub struct UnreadableField {
    pub id: String,
    pub name: String,
    pub order: i64,
}

impl UnreadableField {
    fn from_row(row: &StorageEntity) -> Option<Self> {
        Some(Self {
            id: row.get("id").and_then(Value::as_string)?.to_string(),
            name: row
                .get("name")
                .and_then(Value::as_string)
                .unwrap_or_default()
                .to_string(),
            order: row.get("order").and_then(Value::as_i64).unwrap_or(0),
        })
    }
}

/// Place unreadable rows right behind `readable` dense positions, keeping their
/// relative order. Returns the rows that moved.
pub fn trailing_changes(unreadable: &mut [UnreadableField], readable: usize) -> Vec<OrderChange> {
    unreadable.sort_by_key(|f| f.order);
    unreadable
        .iter_mut()
        .enumerate()
        .filter_map(|(i, field)| {
            let to = (readable + i) as i64;
            if field.order == to {
                return None;
            }
            let from = field.order;
            field.order = to;
            Some(OrderChange {
                id: field.id.clone(),
                from,
                to,
            })
        })
        .collect()
}

/// A collection with its fields and statuses, both sorted by `order`.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSchema {
    pub collection: Collection,
    pub fields: Vec<Field>,
    pub statuses: Vec<Status>,
    /// Field rows with an unknown type. They are left out of `fields` so the rest of
    /// the collection stays usable.
    pub unreadable: Vec<UnreadableField>,
    /// Why each unreadable row was skipped.
    pub issues: Vec<SchemaError>,
}

impl CollectionSchema {
    /// Build a schema from a collection row with `fields` and `statuses` joined.
    pub fn from_row(row: &StorageEntity) -> Result<Self> {
        let collection = Collection::from_row(row)?;
        let mut issues = Vec::new();
        let mut unreadable = Vec::new();

        let mut fields = Vec::new();
        for field_row in nested(row, "fields") {
            match Field::from_row(field_row) {
                Ok(field) => fields.push(field),
                Err(e) => {
                    tracing::warn!("[CollectionSchema] Skipping field of {}: {}", collection.id, e);
                    unreadable.extend(UnreadableField::from_row(field_row));
                    issues.push(e);
                }
            }
        }
        fields.sort_by_key(|f| f.order);
        unreadable.sort_by_key(|f| f.order);

        let mut statuses = nested(row, "statuses")
            .map(Status::from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        statuses.sort_by_key(|s| s.order);

        Ok(Self {
            collection,
            fields,
            statuses,
            unreadable,
            issues,
        })
    }

    pub fn id(&self) -> &str {
        &self.collection.id
    }

    /// The order-0 field, used as card and event title.
    pub fn title_field(&self) -> Option<&Field> {
        self.fields.first()
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn status(&self, id: &str) -> Option<&Status> {
        self.statuses.iter().find(|s| s.id == id)
    }

    pub fn has_statuses(&self) -> bool {
        !self.statuses.is_empty()
    }

    /// First field of type `date`, which drives the calendar view.
    pub fn date_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.field_type == FieldType::Date)
    }

    /// One past the highest order in use, unreadable rows included.
    pub fn next_field_order(&self) -> i64 {
        self.fields
            .iter()
            .map(|f| f.order)
            .chain(self.unreadable.iter().map(|f| f.order))
            .map(|order| order + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn next_status_order(&self) -> i64 {
        self.statuses.iter().map(|s| s.order + 1).max().unwrap_or(0)
    }

    /// Trimmed `name` if no other field (except `except`) already uses it, ignoring case.
    pub fn check_field_name(&self, name: &str, except: Option<&str>) -> Result<String> {
        check_name(
            NamedKind::Field,
            name,
            self.fields
                .iter()
                .filter(|f| Some(f.id.as_str()) != except)
                .map(|f| f.name.as_str())
                .chain(self.unreadable.iter().map(|f| f.name.as_str())),
        )
    }

    pub fn check_status_name(&self, name: &str, except: Option<&str>) -> Result<String> {
        check_name(
            NamedKind::Status,
            name,
            self.statuses
                .iter()
                .filter(|s| Some(s.id.as_str()) != except)
                .map(|s| s.name.as_str()),
        )
    }

    /// The field to remove, unless it is missing or the protected title field.
    pub fn removable_field(&self, field_id: &str) -> Result<&Field> {
        let field = self
            .field(field_id)
            .ok_or_else(|| CoreError::not_found("field", field_id))?;
        if self.title_field().is_some_and(|title| title.id == field.id) {
            return Err(CoreError::ProtectedField {
                field_id: field_id.to_string(),
            });
        }
        Ok(field)
    }

    fn apply_field_order(&mut self, change: &OrderChange) {
        if let Some(field) = self.fields.iter_mut().find(|f| f.id == change.id) {
            field.order = change.to;
            self.fields.sort_by_key(|f| f.order);
        } else if let Some(field) = self.unreadable.iter_mut().find(|f| f.id == change.id) {
            field.order = change.to;
            self.unreadable.sort_by_key(|f| f.order);
        }
    }

    fn apply_status_order(&mut self, change: &OrderChange) {
        if let Some(status) = self.statuses.iter_mut().find(|s| s.id == change.id) {
            status.order = change.to;
            self.statuses.sort_by_key(|s| s.order);
        }
    }
}

fn nested<'a>(row: &'a StorageEntity, column: &str) -> impl Iterator<Item = &'a StorageEntity> {
    row.get(column)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn check_name<'a>(
    kind: NamedKind,
    name: &str,
    mut existing: impl Iterator<Item = &'a str>,
) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    let lowered = name.to_lowercase();
    if existing.any(|other| other.trim().to_lowercase() == lowered) {
        return Err(CoreError::DuplicateName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(name.to_string())
}

fn field_row(collection_id: &str, field: &NewField, order: i64) -> StorageEntity {
    let options = if field.field_type.uses_options() {
        field.options.clone()
    } else {
        Vec::new()
    };
    HashMap::from([
        ("collection_id".to_string(), Value::from(collection_id)),
        ("name".to_string(), Value::from(field.name.trim())),
        ("type".to_string(), Value::from(field.field_type.as_str())),
        ("options".to_string(), Value::from(options)),
        ("required".to_string(), Value::Boolean(field.required)),
        ("order".to_string(), Value::Integer(order)),
    ])
}

fn status_row(collection_id: &str, status: &NewStatus, order: i64) -> StorageEntity {
    HashMap::from([
        ("collection_id".to_string(), Value::from(collection_id)),
        ("name".to_string(), Value::from(status.name.trim())),
        ("color".to_string(), Value::from(status.color.as_str())),
        ("order".to_string(), Value::Integer(order)),
    ])
}

fn order_patch(order: i64) -> StorageEntity {
    HashMap::from([("order".to_string(), Value::Integer(order))])
}

fn single_row(table: Table, id: &str, rows: Vec<StorageEntity>) -> Result<StorageEntity> {
    rows.into_iter()
        .next()
        .ok_or_else(|| CoreError::not_found(table.as_str(), id))
}

/// Persist order changes one row at a time, stopping at the first failure.
/// Returns the updated rows.
pub async fn write_order_changes(
    backend: &dyn PersistenceBackend,
    table: Table,
    changes: &[OrderChange],
) -> Result<Vec<StorageEntity>> {
    let mut rows = Vec::with_capacity(changes.len());
    for change in changes {
        let updated = backend
            .update(
                table,
                RowTarget::Id(change.id.clone()),
                order_patch(change.to),
            )
            .await?;
        rows.extend(updated);
    }
    Ok(rows)
}

/// Schema operations against the persistence collaborator.
#[derive(Clone)]
pub struct SchemaService {
    backend: Arc<dyn PersistenceBackend>,
}

impl SchemaService {
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn PersistenceBackend> {
        &self.backend
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Create a collection with its initial fields and statuses.
    ///
    /// The first field becomes the required title field. Orders are assigned from the
    /// list positions. If the fields or statuses cannot be written the collection row
    /// is deleted again.
    pub async fn create_collection(
        &self,
        session: &Session,
        new: NewCollection,
    ) -> Result<CollectionSchema> {
        let owner = session.require_user()?;
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if new.fields.is_empty() {
            return Err(ValidationError::NoFields.into());
        }
        let mut fields = new.fields;
        fields[0].required = true;
        for (i, field) in fields.iter().enumerate() {
            check_name(
                NamedKind::Field,
                &field.name,
                fields[..i].iter().map(|f| f.name.as_str()),
            )?;
        }
        for (i, status) in new.statuses.iter().enumerate() {
            check_name(
                NamedKind::Status,
                &status.name,
                new.statuses[..i].iter().map(|s| s.name.as_str()),
            )?;
        }

        tracing::info!("[SchemaService] Creating collection '{}' for {}", name, owner);
        let collection_row = HashMap::from([
            ("name".to_string(), Value::from(name)),
            ("description".to_string(), Value::from(new.description.clone())),
            ("icon".to_string(), Value::from(new.icon.as_str())),
            ("view_type".to_string(), Value::from(new.view_type.as_str())),
            ("owner_id".to_string(), Value::from(owner)),
            ("form_definition".to_string(), Value::Array(Vec::new())),
        ]);
        let inserted = self
            .backend
            .insert(Table::Collections, vec![collection_row])
            .await?;
        let mut row = single_row(Table::Collections, "new collection", inserted)?;
        let collection = Collection::from_row(&row)?;

        let children = self
            .insert_children(&collection.id, &fields, &new.statuses)
            .await;
        let (field_rows, status_rows) = match children {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    "[SchemaService] Initial schema of {} failed, removing collection: {}",
                    collection.id,
                    e
                );
                let cleanup = self.backend.delete(Table::Collections, &collection.id).await;
                if let Err(cleanup) = cleanup {
                    tracing::error!(
                        "[SchemaService] Could not remove collection {}: {}",
                        collection.id,
                        cleanup
                    );
                }
                return Err(e);
            }
        };

        row.insert(
            "fields".to_string(),
            Value::Array(field_rows.into_iter().map(Value::Object).collect()),
        );
        row.insert(
            "statuses".to_string(),
            Value::Array(status_rows.into_iter().map(Value::Object).collect()),
        );
        CollectionSchema::from_row(&row)
    }

    async fn insert_children(
        &self,
        collection_id: &str,
        fields: &[NewField],
        statuses: &[NewStatus],
    ) -> Result<(Vec<StorageEntity>, Vec<StorageEntity>)> {
        let field_rows = fields
            .iter()
            .enumerate()
            .map(|(i, f)| field_row(collection_id, f, i as i64))
            .collect();
        let fields = self.backend.insert(Table::Fields, field_rows).await?;

        let statuses = if statuses.is_empty() {
            Vec::new()
        } else {
            let status_rows = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| status_row(collection_id, s, i as i64))
                .collect();
            self.backend.insert(Table::Statuses, status_rows).await?
        };
        Ok((fields, statuses))
    }

    /// Collections owned by the session user, newest first.
    pub async fn list_collections(&self, session: &Session) -> Result<Vec<Collection>> {
        let owner = session.require_user()?;
        let rows = self
            .backend
            .query(
                Table::Collections,
                Query::filtered(Filter::eq("owner_id", owner))
                    .order_by(OrderBy::desc("created_at")),
            )
            .await?;
        rows.iter()
            .map(|row| Collection::from_row(row).map_err(CoreError::from))
            .collect()
    }

    pub async fn load_collection(&self, collection_id: &str) -> Result<CollectionSchema> {
        tracing::debug!("[SchemaService] Loading collection {}", collection_id);
        let rows = self
            .backend
            .query(
                Table::Collections,
                Query::filtered(Filter::eq("id", collection_id))
                    .join(
                        Join::children(Table::Fields, "collection_id")
                            .ordered_by(OrderBy::asc("order")),
                    )
                    .join(
                        Join::children(Table::Statuses, "collection_id")
                            .ordered_by(OrderBy::asc("order")),
                    ),
            )
            .await?;
        let row = single_row(Table::Collections, collection_id, rows)?;
        CollectionSchema::from_row(&row)
    }

    /// Delete a collection with its fields, statuses and entries.
    pub async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        tracing::info!("[SchemaService] Deleting collection {}", collection_id);
        self.backend
            .delete(Table::Collections, collection_id)
            .await
            .map_err(CoreError::from)
    }

    /// Store the form-builder definition on the collection.
    pub async fn update_collection_form_definition(
        &self,
        collection_id: &str,
        fields: &[FormField],
    ) -> Result<Collection> {
        tracing::debug!(
            "[SchemaService] Saving form definition of {} ({} fields)",
            collection_id,
            fields.len()
        );
        let patch = HashMap::from([
            ("form_definition".to_string(), form_definition_value(fields)),
            ("updated_at".to_string(), Value::String(Utc::now().to_rfc3339())),
        ]);
        let rows = self
            .backend
            .update(
                Table::Collections,
                RowTarget::Id(collection_id.to_string()),
                patch,
            )
            .await?;
        Ok(Collection::from_row(&single_row(
            Table::Collections,
            collection_id,
            rows,
        )?)?)
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Append a field at `max(order) + 1`.
    pub async fn add_field(&self, schema: &mut CollectionSchema, new: NewField) -> Result<Field> {
        let name = schema.check_field_name(&new.name, None)?;
        let order = schema.next_field_order();
        let new = NewField { name, ..new };

        let rows = self
            .backend
            .insert(Table::Fields, vec![field_row(schema.id(), &new, order)])
            .await?;
        let field = Field::from_row(&single_row(Table::Fields, &new.name, rows)?)?;
        tracing::debug!(
            "[SchemaService] Added field {} '{}' at order {}",
            field.id,
            field.name,
            field.order
        );
        schema.fields.push(field.clone());
        Ok(field)
    }

    pub async fn update_field(
        &self,
        schema: &mut CollectionSchema,
        field_id: &str,
        patch: FieldPatch,
    ) -> Result<Field> {
        let current = schema
            .field(field_id)
            .ok_or_else(|| CoreError::not_found("field", field_id))?;
        let is_title = schema.title_field().is_some_and(|t| t.id == field_id);
        if is_title && patch.required == Some(false) {
            return Err(ValidationError::TitleMustBeRequired.into());
        }

        let mut row = StorageEntity::new();
        if let Some(name) = &patch.name {
            let name = schema.check_field_name(name, Some(field_id))?;
            row.insert("name".to_string(), Value::from(name));
        }
        let field_type = patch.field_type.unwrap_or(current.field_type);
        if let Some(t) = patch.field_type {
            row.insert("type".to_string(), Value::from(t.as_str()));
        }
        if !field_type.uses_options() {
            row.insert("options".to_string(), Value::Array(Vec::new()));
        } else if let Some(options) = patch.options {
            row.insert("options".to_string(), Value::from(options));
        }
        if let Some(required) = patch.required {
            row.insert("required".to_string(), Value::Boolean(required));
        }

        let rows = self
            .backend
            .update(Table::Fields, RowTarget::Id(field_id.to_string()), row)
            .await?;
        let field = Field::from_row(&single_row(Table::Fields, field_id, rows)?)?;
        if let Some(slot) = schema.fields.iter_mut().find(|f| f.id == field_id) {
            *slot = field.clone();
        }
        Ok(field)
    }

    /// Remove a field and every value stored for it.
    ///
    /// The title field cannot be removed. Values are deleted first, then the field,
    /// then the remaining orders are made dense again. If only that last step fails
    /// the field is gone and `CoreError::IncompleteRemoval` is returned; `schema`
    /// reflects what was written and [`Self::compact_field_orders`] finishes the job.
    pub async fn remove_field(&self, schema: &mut CollectionSchema, field_id: &str) -> Result<()> {
        schema.removable_field(field_id)?;

        let values = self
            .backend
            .query(
                Table::EntryValues,
                Query::filtered(Filter::eq("field_id", field_id)),
            )
            .await?;
        tracing::info!(
            "[SchemaService] Removing field {} and {} stored values",
            field_id,
            values.len()
        );
        for value in &values {
            if let Some(id) = value.get("id").and_then(Value::as_string) {
                self.backend.delete(Table::EntryValues, id).await?;
            }
        }
        self.backend.delete(Table::Fields, field_id).await?;
        schema.fields.retain(|f| f.id != field_id);

        self.compact_field_orders(schema)
            .await
            .map_err(|e| incomplete_removal(NamedKind::Field, field_id, e))
    }

    /// Rewrite field orders as `0..n`, unreadable rows last. Each written row is
    /// applied to `schema` right away, so it matches the backend even on failure.
    pub async fn compact_field_orders(&self, schema: &mut CollectionSchema) -> Result<()> {
        let mut fields = schema.fields.clone();
        let mut changes = densify(&mut fields);
        let mut unreadable = schema.unreadable.clone();
        changes.extend(trailing_changes(&mut unreadable, fields.len()));
        for change in &changes {
            self.write_order(Table::Fields, change).await?;
            schema.apply_field_order(change);
        }
        Ok(())
    }

    /// Rearrange fields to match `sequence` (all field ids in their new order).
    pub async fn reorder_fields(
        &self,
        schema: &mut CollectionSchema,
        sequence: &[String],
    ) -> Result<Vec<OrderChange>> {
        let reordered = apply_sequence(&schema.fields, sequence)?;
        let mut unreadable = schema.unreadable.clone();
        let trailing = trailing_changes(&mut unreadable, reordered.items.len());
        write_order_changes(self.backend.as_ref(), Table::Fields, &reordered.changes).await?;
        write_order_changes(self.backend.as_ref(), Table::Fields, &trailing).await?;
        schema.fields = reordered.items;
        schema.unreadable = unreadable;
        Ok(reordered.changes)
    }

    // =========================================================================
    // Statuses
    // =========================================================================

    pub async fn add_status(
        &self,
        schema: &mut CollectionSchema,
        new: NewStatus,
    ) -> Result<Status> {
        let name = schema.check_status_name(&new.name, None)?;
        let order = schema.next_status_order();
        let new = NewStatus { name, ..new };

        let rows = self
            .backend
            .insert(Table::Statuses, vec![status_row(schema.id(), &new, order)])
            .await?;
        let status = Status::from_row(&single_row(Table::Statuses, &new.name, rows)?)?;
        schema.statuses.push(status.clone());
        Ok(status)
    }

    pub async fn update_status(
        &self,
        schema: &mut CollectionSchema,
        status_id: &str,
        patch: StatusPatch,
    ) -> Result<Status> {
        if schema.status(status_id).is_none() {
            return Err(CoreError::not_found("status", status_id));
        }
        let mut row = StorageEntity::new();
        if let Some(name) = &patch.name {
            let name = schema.check_status_name(name, Some(status_id))?;
            row.insert("name".to_string(), Value::from(name));
        }
        if let Some(color) = patch.color {
            row.insert("color".to_string(), Value::from(color));
        }

        let rows = self
            .backend
            .update(Table::Statuses, RowTarget::Id(status_id.to_string()), row)
            .await?;
        let status = Status::from_row(&single_row(Table::Statuses, status_id, rows)?)?;
        if let Some(slot) = schema.statuses.iter_mut().find(|s| s.id == status_id) {
            *slot = status.clone();
        }
        Ok(status)
    }

    /// Remove a status. Fails with `StatusInUse` while entries are assigned to it.
    ///
    /// Order compaction after the delete behaves as in [`Self::remove_field`].
    pub async fn remove_status(
        &self,
        schema: &mut CollectionSchema,
        status_id: &str,
    ) -> Result<()> {
        if schema.status(status_id).is_none() {
            return Err(CoreError::not_found("status", status_id));
        }
        match self.backend.delete(Table::Statuses, status_id).await {
            Ok(()) => {}
            Err(StorageError::ForeignKeyConflict { .. }) => {
                tracing::warn!("[SchemaService] Status {} is still in use", status_id);
                return Err(CoreError::StatusInUse {
                    status_id: status_id.to_string(),
                    message: STATUS_IN_USE.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
        schema.statuses.retain(|s| s.id != status_id);

        self.compact_status_orders(schema)
            .await
            .map_err(|e| incomplete_removal(NamedKind::Status, status_id, e))
    }

    pub async fn compact_status_orders(&self, schema: &mut CollectionSchema) -> Result<()> {
        let mut statuses = schema.statuses.clone();
        for change in &densify(&mut statuses) {
            self.write_order(Table::Statuses, change).await?;
            schema.apply_status_order(change);
        }
        Ok(())
    }

    pub async fn reorder_statuses(
        &self,
        schema: &mut CollectionSchema,
        sequence: &[String],
    ) -> Result<Vec<OrderChange>> {
        let reordered = apply_sequence(&schema.statuses, sequence)?;
        write_order_changes(self.backend.as_ref(), Table::Statuses, &reordered.changes).await?;
        schema.statuses = reordered.items;
        Ok(reordered.changes)
    }

    async fn write_order(&self, table: Table, change: &OrderChange) -> Result<()> {
        write_order_changes(self.backend.as_ref(), table, std::slice::from_ref(change)).await?;
        Ok(())
    }
}

fn incomplete_removal(kind: NamedKind, id: &str, error: CoreError) -> CoreError {
    tracing::warn!(
        "[SchemaService] Removed {} {} but orders are not compact: {}",
        kind,
        id,
        error
    );
    CoreError::IncompleteRemoval {
        kind,
        id: id.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBackend, Operation};
    use corkboard_api::ErrorKind;

    fn new_collection() -> NewCollection {
        NewCollection {
            name: "Chores".into(),
            description: None,
            icon: "🧹".into(),
            view_type: ViewType::Board,
            fields: vec![
                NewField::new("Title", FieldType::Text),
                NewField::new("Priority", FieldType::Select).with_options(&["Low", "High"]),
            ],
            statuses: vec![NewStatus::new("New", "#ccc"), NewStatus::new("Done", "#0f0")],
        }
    }

    async fn setup() -> (SchemaService, CollectionSchema) {
        let service = SchemaService::new(Arc::new(MemoryBackend::new()));
        let schema = service
            .create_collection(&Session::authenticated("u1"), new_collection())
            .await
            .unwrap();
        (service, schema)
    }

    #[tokio::test]
    async fn test_create_collection_forces_title_required() {
        let (service, schema) = setup().await;
        assert!(schema.fields[0].required);
        assert!(!schema.fields[1].required);
        assert_eq!(schema.statuses.len(), 2);

        let loaded = service.load_collection(schema.id()).await.unwrap();
        assert_eq!(loaded, schema);
    }

    #[tokio::test]
    async fn test_create_collection_validates_locally() {
        let service = SchemaService::new(Arc::new(MemoryBackend::new()));
        let session = Session::authenticated("u1");

        let mut empty = new_collection();
        empty.fields.clear();
        assert_eq!(
            service.create_collection(&session, empty).await.unwrap_err(),
            CoreError::Validation(ValidationError::NoFields)
        );

        let mut dup = new_collection();
        dup.fields.push(NewField::new(" priority ", FieldType::Text));
        assert!(matches!(
            service.create_collection(&session, dup).await,
            Err(CoreError::DuplicateName {
                kind: NamedKind::Field,
                ..
            })
        ));

        assert_eq!(
            service
                .create_collection(&Session::anonymous(), new_collection())
                .await
                .unwrap_err(),
            CoreError::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_add_field_appends_and_rejects_duplicates() {
        let (service, mut schema) = setup().await;
        let due = service
            .add_field(&mut schema, NewField::new("Due", FieldType::Date))
            .await
            .unwrap();
        assert_eq!(due.order, 2);

        let err = service
            .add_field(&mut schema, NewField::new("DUE", FieldType::Text))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::DuplicateName {
                kind: NamedKind::Field,
                name: "DUE".into()
            }
        );
        assert_eq!(schema.fields.len(), 3);
    }

    #[tokio::test]
    async fn test_update_field() {
        let (service, mut schema) = setup().await;
        let title_id = schema.fields[0].id.clone();
        let priority_id = schema.fields[1].id.clone();

        let err = service
            .update_field(
                &mut schema,
                &title_id,
                FieldPatch {
                    required: Some(false),
                    ..FieldPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::Validation(ValidationError::TitleMustBeRequired));

        let updated = service
            .update_field(
                &mut schema,
                &priority_id,
                FieldPatch {
                    name: Some("Effort".into()),
                    field_type: Some(FieldType::Number),
                    ..FieldPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.field_type, FieldType::Number);
        assert!(updated.options.is_empty());
        assert_eq!(schema.fields[1].name, "Effort");
    }

    #[tokio::test]
    async fn test_remove_title_field_is_protected() {
        let (service, mut schema) = setup().await;
        let before = schema.clone();
        let title_id = schema.fields[0].id.clone();

        let err = service.remove_field(&mut schema, &title_id).await.unwrap_err();
        assert_eq!(err, CoreError::ProtectedField { field_id: title_id });
        assert_eq!(schema, before);
    }

    #[tokio::test]
    async fn test_remove_field_densifies() {
        let (service, mut schema) = setup().await;
        service
            .add_field(&mut schema, NewField::new("Due", FieldType::Date))
            .await
            .unwrap();
        let priority_id = schema.fields[1].id.clone();

        service.remove_field(&mut schema, &priority_id).await.unwrap();
        let orders: Vec<i64> = schema.fields.iter().map(|f| f.order).collect();
        assert_eq!(orders, vec![0, 1]);
        assert_eq!(service.load_collection(schema.id()).await.unwrap(), schema);
    }

    #[tokio::test]
    async fn test_reorder_statuses() {
        let (service, mut schema) = setup().await;
        let sequence: Vec<String> = schema.statuses.iter().rev().map(|s| s.id.clone()).collect();
        let changes = service.reorder_statuses(&mut schema, &sequence).await.unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(schema.statuses[0].name, "Done");
        assert_eq!(service.load_collection(schema.id()).await.unwrap(), schema);
    }

    #[tokio::test]
    async fn test_unknown_field_type_is_reported_not_fatal() {
        let backend = Arc::new(MemoryBackend::new());
        let service = SchemaService::new(backend.clone());
        let schema = service
            .create_collection(&Session::authenticated("u1"), new_collection())
            .await
            .unwrap();
        backend
            .insert(
                Table::Fields,
                vec![HashMap::from([
                    ("collection_id".to_string(), Value::from(schema.id())),
                    ("name".to_string(), Value::from("Stars")),
                    ("type".to_string(), Value::from("rating")),
                    ("order".to_string(), Value::Integer(2)),
                ])],
            )
            .await
            .unwrap();

        let loaded = service.load_collection(schema.id()).await.unwrap();
        assert_eq!(loaded.fields.len(), 2);
        assert_eq!(
            loaded.issues,
            vec![SchemaError::UnknownFieldType {
                tag: "rating".into()
            }]
        );
    }

    async fn with_unreadable_field() -> (MemoryBackend, SchemaService, CollectionSchema) {
        let backend = MemoryBackend::new();
        let service = SchemaService::new(Arc::new(backend.clone()));
        let created = service
            .create_collection(&Session::authenticated("u1"), new_collection())
            .await
            .unwrap();
        backend
            .insert(
                Table::Fields,
                vec![HashMap::from([
                    ("collection_id".to_string(), Value::from(created.id())),
                    ("name".to_string(), Value::from("Stars")),
                    ("type".to_string(), Value::from("rating")),
                    ("order".to_string(), Value::Integer(2)),
                ])],
            )
            .await
            .unwrap();
        let schema = service.load_collection(created.id()).await.unwrap();
        (backend, service, schema)
    }

    async fn stored_field_orders(backend: &MemoryBackend) -> Vec<(i64, String)> {
        let mut stored: Vec<(i64, String)> = backend
            .rows(Table::Fields)
            .await
            .iter()
            .map(|r| {
                (
                    r["order"].as_i64().unwrap(),
                    r["name"].as_string().unwrap().to_string(),
                )
            })
            .collect();
        stored.sort();
        stored
    }

    #[tokio::test]
    async fn test_unreadable_field_keeps_its_order_and_name() {
        let (backend, service, mut schema) = with_unreadable_field().await;
        assert_eq!(schema.unreadable.len(), 1);
        assert_eq!(schema.unreadable[0].order, 2);

        let due = service
            .add_field(&mut schema, NewField::new("Due", FieldType::Date))
            .await
            .unwrap();
        assert_eq!(due.order, 3);
        let orders: Vec<i64> = stored_field_orders(&backend)
            .await
            .iter()
            .map(|(order, _)| *order)
            .collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);

        let err = service
            .add_field(&mut schema, NewField::new("stars", FieldType::Number))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateName { .. }));

        let priority = schema.fields[1].id.clone();
        service.remove_field(&mut schema, &priority).await.unwrap();
        assert_eq!(
            stored_field_orders(&backend).await,
            vec![
                (0, "Title".to_string()),
                (1, "Due".to_string()),
                (2, "Stars".to_string()),
            ]
        );
        assert_eq!(service.load_collection(schema.id()).await.unwrap(), schema);
    }

    #[tokio::test]
    async fn test_reorder_fields_moves_unreadable_rows_last() {
        let (backend, service, mut schema) = with_unreadable_field().await;
        service
            .add_field(&mut schema, NewField::new("Due", FieldType::Date))
            .await
            .unwrap();
        let sequence: Vec<String> = schema.fields.iter().rev().map(|f| f.id.clone()).collect();
        service.reorder_fields(&mut schema, &sequence).await.unwrap();

        assert_eq!(
            stored_field_orders(&backend).await,
            vec![
                (0, "Due".to_string()),
                (1, "Priority".to_string()),
                (2, "Title".to_string()),
                (3, "Stars".to_string()),
            ]
        );
        assert_eq!(service.load_collection(schema.id()).await.unwrap(), schema);
    }

    #[tokio::test]
    async fn test_failed_compaction_reports_incomplete_removal() {
        let backend = MemoryBackend::new();
        let service = SchemaService::new(Arc::new(backend.clone()));
        let mut new = new_collection();
        new.fields.push(NewField::new("Notes", FieldType::Text));
        let mut schema = service
            .create_collection(&Session::authenticated("u1"), new)
            .await
            .unwrap();
        let priority = schema.fields[1].id.clone();
        backend
            .fail_next(
                Table::Fields,
                Operation::Update,
                StorageError::Transport("down".into()),
            )
            .await;

        let err = service.remove_field(&mut schema, &priority).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialWriteFailure);
        assert!(matches!(
            &err,
            CoreError::IncompleteRemoval { kind: NamedKind::Field, id, .. } if *id == priority
        ));
        // The field is gone and the local schema matches what was written.
        assert!(schema.field(&priority).is_none());
        assert_eq!(service.load_collection(schema.id()).await.unwrap(), schema);

        service.compact_field_orders(&mut schema).await.unwrap();
        let orders: Vec<i64> = schema.fields.iter().map(|f| f.order).collect();
        assert_eq!(orders, vec![0, 1]);
        assert_eq!(service.load_collection(schema.id()).await.unwrap(), schema);
    }

    #[tokio::test]
    async fn test_failed_status_compaction_reports_incomplete_removal() {
        let backend = MemoryBackend::new();
        let service = SchemaService::new(Arc::new(backend.clone()));
        let mut schema = service
            .create_collection(&Session::authenticated("u1"), new_collection())
            .await
            .unwrap();
        let first = schema.statuses[0].id.clone();
        backend
            .fail_next(
                Table::Statuses,
                Operation::Update,
                StorageError::Transport("down".into()),
            )
            .await;

        let err = service.remove_status(&mut schema, &first).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialWriteFailure);
        assert_eq!(schema.statuses.len(), 1);
        assert_eq!(service.load_collection(schema.id()).await.unwrap(), schema);

        service.compact_status_orders(&mut schema).await.unwrap();
        assert_eq!(schema.statuses[0].order, 0);
    }
}
