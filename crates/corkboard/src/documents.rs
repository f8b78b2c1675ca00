//! Documents attached to a collection or to one of its entries.
//!
//! The file goes to file storage first and the `documents` row is written after it.
//! A row that cannot be written takes its file with it. Deleting an entry keeps its
//! documents at collection level.

use corkboard_api::{CoreError, Document, StorageEntity, ValidationError, Value};
use corkboard_core::{FileStorage, Filter, OrderBy, PersistenceBackend, Query, Table};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::records::file_extension;
use crate::session::Session;

type Result<T> = std::result::Result<T, CoreError>;

const COLLECTION_LEVEL: &str = "collection_level";

#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub file_name: String,
    /// Display name. Falls back to `file_name`.
    pub name: Option<String>,
    pub content_type: String,
    pub kind: Option<String>,
    pub bytes: Vec<u8>,
}

impl NewDocument {
    pub fn new(file_name: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            name: None,
            content_type: content_type.to_string(),
            kind: None,
            bytes,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

#[derive(Clone)]
pub struct DocumentStore {
    backend: Arc<dyn PersistenceBackend>,
    files: Arc<dyn FileStorage>,
    prefix: String,
}

impl DocumentStore {
    pub fn new(
        backend: Arc<dyn PersistenceBackend>,
        files: Arc<dyn FileStorage>,
        prefix: &str,
    ) -> Self {
        Self {
            backend,
            files,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Every document of a collection, entry-level ones included, newest first.
    pub async fn list_for_collection(&self, collection_id: &str) -> Result<Vec<Document>> {
        self.list(Filter::eq("collection_id", collection_id)).await
    }

    /// Documents attached to one entry, newest first.
    pub async fn list_for_entry(
        &self,
        collection_id: &str,
        entry_id: &str,
    ) -> Result<Vec<Document>> {
        self.list(Filter::And(vec![
            Filter::eq("collection_id", collection_id),
            Filter::eq("entry_id", entry_id),
        ]))
        .await
    }

    async fn list(&self, filter: Filter) -> Result<Vec<Document>> {
        let rows = self
            .backend
            .query(
                Table::Documents,
                Query::filtered(filter).order_by(OrderBy::desc("created_at")),
            )
            .await?;
        tracing::debug!("[DocumentStore] Found {} documents", rows.len());
        rows.iter()
            .map(|row| Document::from_row(row).map_err(CoreError::from))
            .collect()
    }

    /// Store a document under a collection, or under one of its entries.
    pub async fn upload(
        &self,
        session: &Session,
        collection_id: &str,
        entry_id: Option<&str>,
        new: NewDocument,
    ) -> Result<Document> {
        let user = session.require_user()?;
        let name = new.name.as_deref().unwrap_or(&new.file_name).trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.backend.get(Table::Collections, collection_id).await?.is_none() {
            return Err(CoreError::not_found("collection", collection_id));
        }
        if let Some(entry_id) = entry_id {
            let entry = self.backend.get(Table::Entries, entry_id).await?;
            let owner = entry
                .as_ref()
                .and_then(|row| row.get("collection_id"))
                .and_then(Value::as_string);
            if owner != Some(collection_id) {
                return Err(CoreError::not_found("entry", entry_id));
            }
        }

        let unique = Uuid::new_v4().simple().to_string();
        let file_name = match file_extension(&new.file_name) {
            Some(ext) => format!("{}.{}", unique, ext),
            None => unique,
        };
        let path_hint = format!(
            "{}/{}/{}/{}",
            self.prefix,
            collection_id,
            entry_id.unwrap_or(COLLECTION_LEVEL),
            file_name
        );
        let size = new.bytes.len() as i64;
        let path = self.files.put(new.bytes, &path_hint).await?;
        tracing::info!("[DocumentStore] Uploaded '{}' to {}", name, path);

        let mut row: StorageEntity = HashMap::from([
            ("collection_id".to_string(), Value::from(collection_id)),
            ("entry_id".to_string(), Value::from(entry_id.map(str::to_string))),
            ("name".to_string(), Value::from(name)),
            ("content_type".to_string(), Value::from(new.content_type)),
            ("size".to_string(), Value::Integer(size)),
            ("storage_path".to_string(), Value::from(path.as_str())),
            ("url".to_string(), Value::from(self.files.public_url(&path))),
            ("created_by".to_string(), Value::from(user)),
        ]);
        if let Some(kind) = new.kind {
            row.insert("type".to_string(), Value::from(kind));
        }

        let inserted = match self.backend.insert(Table::Documents, vec![row]).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("[DocumentStore] Record for {} failed, removing file: {}", path, e);
                if let Err(cleanup) = self.files.remove(&path).await {
                    tracing::warn!(
                        "[DocumentStore] Could not remove orphaned document {}: {}",
                        path,
                        cleanup
                    );
                }
                return Err(e.into());
            }
        };
        let row = inserted
            .first()
            .ok_or_else(|| CoreError::not_found("document", &path))?;
        Ok(Document::from_row(row)?)
    }

    /// Delete a document record, then its file. A file that cannot be removed is
    /// logged and left behind; the record is gone either way.
    pub async fn delete(&self, document_id: &str) -> Result<()> {
        let row = self
            .backend
            .get(Table::Documents, document_id)
            .await?
            .ok_or_else(|| CoreError::not_found("document", document_id))?;
        let document = Document::from_row(&row)?;

        self.backend.delete(Table::Documents, document_id).await?;
        if let Err(e) = self.files.remove(&document.storage_path).await {
            tracing::warn!(
                "[DocumentStore] Deleted document {} but not its file {}: {}",
                document_id,
                document.storage_path,
                e
            );
        }
        tracing::info!("[DocumentStore] Deleted document {}", document_id);
        Ok(())
    }
}
