//! Collaborator traits
//!
//! The core never talks to a concrete database, blob store or auth provider. It
//! consumes these three interfaces, which can be backed by a remote service or by
//! the in-memory implementations used in tests.

use async_trait::async_trait;
use corkboard_api::StorageEntity;

use crate::storage::types::{Filter, Query, Result, RowTarget, Table};

/// Generic CRUD/query store holding one table per entity.
///
/// Implementations own referential integrity: deleting a row that is still
/// referenced under a RESTRICT rule fails with `StorageError::ForeignKeyConflict`,
/// CASCADE rules delete dependents.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Insert rows and return them as stored. Missing `id`s are generated and
    /// `created_at`/`updated_at` are stamped.
    async fn insert(&self, table: Table, rows: Vec<StorageEntity>) -> Result<Vec<StorageEntity>>;

    /// Apply `patch` to every targeted row and return the updated rows.
    async fn update(
        &self,
        table: Table,
        target: RowTarget,
        patch: StorageEntity,
    ) -> Result<Vec<StorageEntity>>;

    /// Insert rows, or merge them into the existing row that has the same values in
    /// `conflict_columns`.
    async fn upsert(
        &self,
        table: Table,
        rows: Vec<StorageEntity>,
        conflict_columns: &[&str],
    ) -> Result<Vec<StorageEntity>>;

    async fn delete(&self, table: Table, id: &str) -> Result<()>;

    async fn query(&self, table: Table, query: Query) -> Result<Vec<StorageEntity>>;

    async fn get(&self, table: Table, id: &str) -> Result<Option<StorageEntity>> {
        let rows = self.query(table, Query::filtered(Filter::eq("id", id))).await?;
        Ok(rows.into_iter().next())
    }
}

/// Blob storage for `file` field values.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store `bytes` and return the path they were stored under. `path_hint` is used
    /// as the path when the store accepts it.
    async fn put(&self, bytes: Vec<u8>, path_hint: &str) -> Result<String>;

    /// Publicly resolvable URL for a stored path, if the store exposes one.
    fn public_url(&self, path: &str) -> Option<String>;

    async fn remove(&self, path: &str) -> Result<()>;
}

/// Source of the signed-in user.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}
