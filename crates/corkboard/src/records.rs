//! Record store
//!
//! Entries are stored as one `entries` row plus one `entry_values` row per field
//! that has a value. Input is validated against the collection schema before
//! anything is sent to the persistence collaborator.

use corkboard_api::{
    Comment, CoreError, Entry, EntryValue, FieldType, StorageEntity, UserProfile,
    ValidationError, Value,
};
use corkboard_core::{
    FileStorage, Filter, Join, OrderBy, PersistenceBackend, Query, RowTarget, Table, registry,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::schema::CollectionSchema;
use crate::session::Session;

type Result<T> = std::result::Result<T, CoreError>;

/// Field values keyed by field id. `None` leaves a field without a value.
pub type ValueMap = HashMap<String, Option<String>>;

const VALUE_CONFLICT_COLUMNS: &[&str] = &["entry_id", "field_id"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEntry {
    pub status_id: Option<String>,
    pub values: ValueMap,
    pub assigned_to: Option<String>,
}

impl NewEntry {
    pub fn new(status_id: Option<&str>) -> Self {
        Self {
            status_id: status_id.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn value(mut self, field_id: &str, value: &str) -> Self {
        self.values
            .insert(field_id.to_string(), Some(value.to_string()));
        self
    }
}

/// Check a status against the schema. Collections with statuses require one.
fn check_status(schema: &CollectionSchema, status_id: Option<&str>) -> Result<()> {
    match status_id {
        Some(id) if schema.status(id).is_none() => Err(ValidationError::UnknownStatus {
            status_id: id.to_string(),
        }
        .into()),
        None if schema.has_statuses() => Err(ValidationError::StatusRequired.into()),
        _ => Ok(()),
    }
}

/// Validate `values` and return the non-null ones in canonical stored form.
///
/// With `complete` every required field must be present; otherwise only the given
/// values are checked.
pub fn validate_values(
    schema: &CollectionSchema,
    values: &ValueMap,
    complete: bool,
) -> Result<Vec<(String, String)>> {
    for field_id in values.keys() {
        if schema.field(field_id).is_none() {
            return Err(ValidationError::UnknownField {
                field_id: field_id.clone(),
            }
            .into());
        }
    }

    let mut normalized = Vec::new();
    for field in &schema.fields {
        let raw = match values.get(&field.id) {
            Some(raw) => raw.as_deref(),
            None if complete => None,
            None => continue,
        };
        if complete || raw.is_some_and(|r| !r.trim().is_empty()) {
            registry::validate(field, raw)?;
        }
        if let Some(stored) = registry::normalize(field.field_type, raw)? {
            normalized.push((field.id.clone(), stored));
        }
    }
    Ok(normalized)
}

fn value_row(entry_id: &str, field_id: &str, value: &str) -> StorageEntity {
    HashMap::from([
        ("entry_id".to_string(), Value::from(entry_id)),
        ("field_id".to_string(), Value::from(field_id)),
        ("value".to_string(), Value::from(value)),
    ])
}

pub(crate) fn file_extension(file_name: &str) -> Option<&str> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && !ext.contains('/'))
}

/// Entries, values, comments and file attachments.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn PersistenceBackend>,
    files: Arc<dyn FileStorage>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn PersistenceBackend>, files: Arc<dyn FileStorage>) -> Self {
        Self { backend, files }
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Create an entry and its values.
    ///
    /// The entry row is written first. If the values cannot be written afterwards the
    /// entry exists without them, which is reported as `CoreError::PartialWrite`
    /// carrying the created entry.
    pub async fn create_entry(
        &self,
        session: &Session,
        schema: &CollectionSchema,
        new: NewEntry,
    ) -> Result<Entry> {
        let user = session.require_user()?;
        check_status(schema, new.status_id.as_deref())?;
        let values = validate_values(schema, &new.values, true)?;

        let row = HashMap::from([
            ("collection_id".to_string(), Value::from(schema.id())),
            ("status_id".to_string(), Value::from(new.status_id.clone())),
            ("created_by".to_string(), Value::from(user)),
            ("assigned_to".to_string(), Value::from(new.assigned_to.clone())),
        ]);
        let inserted = self.backend.insert(Table::Entries, vec![row]).await?;
        let mut entry = inserted
            .first()
            .map(Entry::from_row)
            .ok_or_else(|| CoreError::not_found("entry", "new entry"))??;
        tracing::info!(
            "[RecordStore] Created entry {} in {} with {} values",
            entry.id,
            schema.id(),
            values.len()
        );

        if values.is_empty() {
            return Ok(entry);
        }
        let rows = values
            .iter()
            .map(|(field_id, value)| value_row(&entry.id, field_id, value))
            .collect();
        match self.backend.insert(Table::EntryValues, rows).await {
            Ok(rows) => {
                for row in &rows {
                    entry.upsert_value(EntryValue::from_row(row)?);
                }
                Ok(entry)
            }
            Err(e) => {
                tracing::warn!(
                    "[RecordStore] Entry {} was created but its values failed: {}",
                    entry.id,
                    e
                );
                Err(CoreError::PartialWrite {
                    entry: Box::new(entry),
                    message: format!("its values could not be saved: {}", e),
                })
            }
        }
    }

    /// Upsert the non-null values of an entry. Null values are skipped, never deleted.
    pub async fn update_entry_values(
        &self,
        schema: &CollectionSchema,
        entry_id: &str,
        values: &ValueMap,
    ) -> Result<Vec<EntryValue>> {
        let values = validate_values(schema, values, false)?;
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let rows = values
            .iter()
            .map(|(field_id, value)| value_row(entry_id, field_id, value))
            .collect();
        let written = self
            .backend
            .upsert(Table::EntryValues, rows, VALUE_CONFLICT_COLUMNS)
            .await?;
        tracing::debug!(
            "[RecordStore] Upserted {} values of entry {}",
            written.len(),
            entry_id
        );
        written
            .iter()
            .map(|row| EntryValue::from_row(row).map_err(CoreError::from))
            .collect()
    }

    /// Move an entry to another status. The returned entry does not carry values.
    pub async fn update_entry_status(
        &self,
        schema: &CollectionSchema,
        entry_id: &str,
        status_id: &str,
    ) -> Result<Entry> {
        check_status(schema, Some(status_id))?;
        tracing::debug!("[RecordStore] Moving entry {} to status {}", entry_id, status_id);
        let rows = self
            .backend
            .update(
                Table::Entries,
                RowTarget::Id(entry_id.to_string()),
                HashMap::from([("status_id".to_string(), Value::from(status_id))]),
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| CoreError::not_found("entry", entry_id))?;
        Ok(Entry::from_row(row)?)
    }

    /// Delete an entry. Its values and comments go with it.
    pub async fn delete_entry(&self, entry_id: &str) -> Result<()> {
        tracing::info!("[RecordStore] Deleting entry {}", entry_id);
        Ok(self.backend.delete(Table::Entries, entry_id).await?)
    }

    pub async fn get_entry(&self, entry_id: &str) -> Result<Entry> {
        let rows = self
            .backend
            .query(
                Table::Entries,
                Query::filtered(Filter::eq("id", entry_id))
                    .join(Join::children(Table::EntryValues, "entry_id")),
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| CoreError::not_found("entry", entry_id))?;
        Ok(Entry::from_row(row)?)
    }

    /// Entries of a collection with their values, newest first.
    pub async fn list_entries(&self, collection_id: &str) -> Result<Vec<Entry>> {
        let rows = self
            .backend
            .query(
                Table::Entries,
                Query::filtered(Filter::eq("collection_id", collection_id))
                    .order_by(OrderBy::desc("created_at"))
                    .join(Join::children(Table::EntryValues, "entry_id")),
            )
            .await?;
        rows.iter()
            .map(|row| Entry::from_row(row).map_err(CoreError::from))
            .collect()
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Upload a file and store its path as the value of a `file` field.
    ///
    /// The blob is stored under `<user>/<entry>/<unique>.<ext>`. If the value cannot be
    /// written the blob is removed again.
    pub async fn attach_file(
        &self,
        session: &Session,
        schema: &CollectionSchema,
        entry_id: &str,
        field_id: &str,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<EntryValue> {
        let user = session.require_user()?;
        let field = schema
            .field(field_id)
            .ok_or_else(|| ValidationError::UnknownField {
                field_id: field_id.to_string(),
            })?;
        if field.field_type != FieldType::File {
            return Err(ValidationError::WrongType {
                field: field.name.clone(),
                expected: FieldType::File,
                value: file_name.to_string(),
            }
            .into());
        }

        let unique = Uuid::new_v4().simple().to_string();
        let path_hint = match file_extension(file_name) {
            Some(ext) => format!("{}/{}/{}.{}", user, entry_id, unique, ext),
            None => format!("{}/{}/{}", user, entry_id, unique),
        };
        let path = self.files.put(bytes, &path_hint).await?;
        tracing::debug!("[RecordStore] Uploaded {} for entry {}", path, entry_id);

        let written = self
            .backend
            .upsert(
                Table::EntryValues,
                vec![value_row(entry_id, field_id, &path)],
                VALUE_CONFLICT_COLUMNS,
            )
            .await;
        let rows = match written {
            Ok(rows) => rows,
            Err(e) => {
                if let Err(cleanup) = self.files.remove(&path).await {
                    tracing::warn!(
                        "[RecordStore] Could not remove orphaned upload {}: {}",
                        path,
                        cleanup
                    );
                }
                return Err(e.into());
            }
        };
        let row = rows
            .first()
            .ok_or_else(|| CoreError::not_found("entry_value", entry_id))?;
        Ok(EntryValue::from_row(row)?)
    }

    /// Display URL for a stored file value. Absolute URLs are returned unchanged.
    pub fn file_url(&self, path: &str) -> Option<String> {
        if path.is_empty() {
            return None;
        }
        if path.starts_with("http://") || path.starts_with("https://") {
            return Some(path.to_string());
        }
        self.files.public_url(path)
    }

    // =========================================================================
    // Comments and users
    // =========================================================================

    /// Comments on an entry, oldest first, with the commenter's profile.
    pub async fn list_comments(&self, entry_id: &str) -> Result<Vec<Comment>> {
        let rows = self
            .backend
            .query(
                Table::Comments,
                Query::filtered(Filter::eq("entry_id", entry_id))
                    .order_by(OrderBy::asc("created_at"))
                    .join(Join::parent(Table::Users, "user_id", "user")),
            )
            .await?;
        rows.iter()
            .map(|row| Comment::from_row(row).map_err(CoreError::from))
            .collect()
    }

    pub async fn add_comment(
        &self,
        session: &Session,
        entry_id: &str,
        content: &str,
    ) -> Result<Comment> {
        let user = session.require_user()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyComment.into());
        }

        let inserted = self
            .backend
            .insert(
                Table::Comments,
                vec![HashMap::from([
                    ("entry_id".to_string(), Value::from(entry_id)),
                    ("user_id".to_string(), Value::from(user)),
                    ("content".to_string(), Value::from(content)),
                ])],
            )
            .await?;
        let mut comment = inserted
            .first()
            .map(Comment::from_row)
            .ok_or_else(|| CoreError::not_found("comment", entry_id))??;
        comment.user = self.get_user_profile(user).await?;
        Ok(comment)
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        Ok(self.backend.delete(Table::Comments, comment_id).await?)
    }

    pub async fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        match self.backend.get(Table::Users, user_id).await? {
            Some(row) => Ok(Some(UserProfile::from_row(&row)?)),
            None => Ok(None),
        }
    }
}
