use corkboard_api::CoreError;
use corkboard_core::{FileStorage, PersistenceBackend};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::CorkboardConfig;
use crate::documents::DocumentStore;
use crate::projections::{self, BoardProjection, CalendarProjection, TableProjection};
use crate::records::RecordStore;
use crate::schema::{CollectionSchema, SchemaService};
use crate::storage::{MemoryBackend, MemoryFileStorage};
use crate::sync::{BoardSurface, FieldOrderSurface, FormCanvasSurface, StatusOrderSurface};

type Result<T> = std::result::Result<T, CoreError>;

/// Entry point wiring the schema and record services to their collaborators and
/// opening sync surfaces for a collection.
#[derive(Clone)]
pub struct Corkboard {
    config: Arc<CorkboardConfig>,
    schema: SchemaService,
    records: RecordStore,
    documents: DocumentStore,
}

impl Corkboard {
    pub fn new(
        config: CorkboardConfig,
        backend: Arc<dyn PersistenceBackend>,
        files: Arc<dyn FileStorage>,
    ) -> Self {
        info!(
            "[Corkboard] Starting (bucket {}, notice capacity {})",
            config.storage.bucket, config.sync.notice_capacity
        );
        Self {
            schema: SchemaService::new(backend.clone()),
            documents: DocumentStore::new(
                backend.clone(),
                files.clone(),
                &config.storage.documents_prefix,
            ),
            records: RecordStore::new(backend, files),
            config: Arc::new(config),
        }
    }

    /// An engine backed by the in-memory collaborators.
    pub fn in_memory(config: CorkboardConfig) -> (Self, MemoryBackend) {
        let backend = MemoryBackend::new();
        let files = MemoryFileStorage::new(&config.storage);
        let engine = Self::new(config, Arc::new(backend.clone()), Arc::new(files));
        (engine, backend)
    }

    pub fn config(&self) -> &CorkboardConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaService {
        &self.schema
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    // =========================================================================
    // Surfaces
    // =========================================================================

    /// Load a collection's entries and open its board.
    pub async fn open_board(&self, schema: Arc<CollectionSchema>) -> Result<BoardSurface> {
        let entries = self.records.list_entries(schema.id()).await?;
        debug!(
            "[Corkboard] Opening board for {} with {} entries",
            schema.id(),
            entries.len()
        );
        Ok(BoardSurface::open(
            self.records.clone(),
            schema,
            entries,
            &self.config.sync,
        ))
    }

    pub fn open_field_order(&self, schema: &CollectionSchema) -> FieldOrderSurface {
        FieldOrderSurface::open(self.schema.backend().clone(), schema, &self.config.sync)
    }

    pub fn open_status_order(&self, schema: &CollectionSchema) -> StatusOrderSurface {
        StatusOrderSurface::open(self.schema.backend().clone(), schema, &self.config.sync)
    }

    pub fn open_form_canvas(&self, schema: &CollectionSchema) -> FormCanvasSurface {
        FormCanvasSurface::open(self.schema.clone(), &schema.collection, &self.config.sync)
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub async fn board_view(&self, schema: &CollectionSchema) -> Result<BoardProjection> {
        let entries = self.records.list_entries(schema.id()).await?;
        Ok(projections::board(schema, &entries, &self.config.display))
    }

    pub async fn table_view(&self, schema: &CollectionSchema) -> Result<TableProjection> {
        let entries = self.records.list_entries(schema.id()).await?;
        Ok(projections::table(schema, &entries, &self.config.display))
    }

    pub async fn calendar_view(&self, schema: &CollectionSchema) -> Result<CalendarProjection> {
        let entries = self.records.list_entries(schema.id()).await?;
        Ok(projections::calendar(schema, &entries, &self.config.display))
    }
}
