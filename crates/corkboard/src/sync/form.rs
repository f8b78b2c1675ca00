//! Form-builder canvas surface.
//!
//! Editing the canvas is local. Only `save` writes, storing the whole definition on
//! the collection.

use corkboard_api::{Collection, CoreError, FieldType, FormField};
use corkboard_core::{SyncNotice, SyncOutcome, SyncPhase};
use tokio::sync::broadcast;

use super::surface::{Plan, SyncSurface};
use crate::config::SyncConfig;
use crate::form_builder::{FormCanvas, FormFieldPatch};
use crate::schema::SchemaService;

#[derive(Clone)]
pub struct FormCanvasSurface {
    surface: SyncSurface<FormCanvas>,
    schema: SchemaService,
    collection_id: String,
}

impl FormCanvasSurface {
    /// Open the canvas on the collection's saved form definition.
    pub fn open(schema: SchemaService, collection: &Collection, config: &SyncConfig) -> Self {
        let name = format!("form:{}", collection.id);
        let canvas = FormCanvas::from_definition(collection.form_definition.clone());
        Self {
            surface: SyncSurface::new(&name, canvas, config.notice_capacity),
            schema,
            collection_id: collection.id.clone(),
        }
    }

    pub fn name(&self) -> &str {
        self.surface.name()
    }

    pub async fn canvas(&self) -> FormCanvas {
        self.surface.state().await
    }

    pub async fn phase(&self) -> SyncPhase {
        self.surface.phase().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.surface.subscribe()
    }

    pub async fn close(&self) {
        self.surface.close().await;
    }

    /// Apply `edit` to a copy of the canvas and keep the copy if it succeeds.
    async fn edit<R>(
        &self,
        edit: impl FnOnce(&mut FormCanvas) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let mut result = None;
        self.surface
            .run_local(|canvas| {
                let mut next = canvas.clone();
                result = Some(edit(&mut next)?);
                Ok(Some(next))
            })
            .await?;
        result.ok_or_else(|| CoreError::SurfaceClosed {
            surface: self.surface.name().to_string(),
        })
    }

    /// Drop a new field from the palette onto the end of the canvas.
    pub async fn add_field(&self, field_type: FieldType) -> Result<FormField, CoreError> {
        let field = FormCanvas::palette_field(field_type);
        tracing::debug!("[Sync:{}] Adding {}", self.name(), field.id);
        self.edit(|canvas| {
            canvas.add(field.clone());
            Ok(field)
        })
        .await
    }

    pub async fn select(&self, field_id: &str) -> Result<(), CoreError> {
        self.edit(|canvas| canvas.select(field_id)).await
    }

    pub async fn deselect(&self) -> Result<(), CoreError> {
        self.edit(|canvas| {
            canvas.deselect();
            Ok(())
        })
        .await
    }

    pub async fn update_field(
        &self,
        field_id: &str,
        patch: FormFieldPatch,
    ) -> Result<FormField, CoreError> {
        self.edit(|canvas| canvas.update(field_id, patch).cloned()).await
    }

    pub async fn remove_field(&self, field_id: &str) -> Result<FormField, CoreError> {
        self.edit(|canvas| canvas.remove(field_id)).await
    }

    /// Reorder fields on the canvas. Nothing is written until `save`.
    pub async fn move_field(&self, from: usize, to: usize) -> Result<SyncOutcome, CoreError> {
        self.surface
            .run_local(|canvas| {
                let mut next = canvas.clone();
                Ok(next.reorder(from, to)?.then_some(next))
            })
            .await
    }

    /// Persist the canvas as the collection's form definition.
    pub async fn save(&self) -> Result<SyncOutcome, CoreError> {
        let schema = self.schema.clone();
        let collection_id = self.collection_id.clone();
        self.surface
            .run(
                |canvas: &FormCanvas| {
                    if !canvas.is_dirty() {
                        return Ok(Plan::NoOp);
                    }
                    let mut next = canvas.clone();
                    next.mark_saved();
                    Ok(Plan::Remote {
                        change: next.fields().to_vec(),
                        next,
                    })
                },
                |fields| async move {
                    schema
                        .update_collection_form_definition(&collection_id, &fields)
                        .await
                        .map(|_| None)
                },
            )
            .await
    }
}
