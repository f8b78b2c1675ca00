//! Form-builder working set.
//!
//! A [`FormCanvas`] holds the fields dropped onto the canvas and the current
//! selection. Nothing here is persisted; saving goes through
//! [`FormCanvasSurface`](crate::sync::FormCanvasSurface).

use corkboard_api::{CoreError, FieldType, FormField, ValidationError};
use corkboard_core::{registry, reorder};
use uuid::Uuid;

use crate::schema::NewField;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormFieldPatch {
    pub label: Option<String>,
    pub placeholder: Option<Option<String>>,
    pub required: Option<bool>,
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormCanvas {
    fields: Vec<FormField>,
    selected: Option<String>,
    dirty: bool,
}

impl FormCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// A canvas showing a saved form definition.
    pub fn from_definition(fields: Vec<FormField>) -> Self {
        Self {
            fields,
            selected: None,
            dirty: false,
        }
    }

    /// A new field as dropped from the palette, with a unique `<type>-<uuid>` id.
    pub fn palette_field(field_type: FieldType) -> FormField {
        FormField {
            id: format!("{}-{}", field_type.as_str(), Uuid::new_v4().simple()),
            field_type,
            label: registry::palette_label(field_type).to_string(),
            placeholder: None,
            required: false,
            options: Vec::new(),
        }
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn field(&self, id: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn selected(&self) -> Option<&FormField> {
        self.selected.as_deref().and_then(|id| self.field(id))
    }

    /// Whether the canvas has changes that were not saved yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn position(&self, id: &str) -> Result<usize, CoreError> {
        self.fields
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| CoreError::not_found("form field", id))
    }

    /// Append a field and select it.
    pub fn add(&mut self, field: FormField) {
        self.selected = Some(field.id.clone());
        self.fields.push(field);
        self.dirty = true;
    }

    pub fn select(&mut self, id: &str) -> Result<(), CoreError> {
        self.position(id)?;
        self.selected = Some(id.to_string());
        Ok(())
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    pub fn update(&mut self, id: &str, patch: FormFieldPatch) -> Result<&FormField, CoreError> {
        let index = self.position(id)?;
        let field = &mut self.fields[index];
        if let Some(label) = patch.label {
            let label = label.trim();
            if label.is_empty() {
                return Err(ValidationError::EmptyName.into());
            }
            field.label = label.to_string();
        }
        if let Some(placeholder) = patch.placeholder {
            field.placeholder = placeholder;
        }
        if let Some(required) = patch.required {
            field.required = required;
        }
        if let Some(options) = patch.options {
            if field.field_type.uses_options() {
                field.options = options;
            }
        }
        self.dirty = true;
        Ok(&self.fields[index])
    }

    /// Remove a field. Removing the selected field clears the selection.
    pub fn remove(&mut self, id: &str) -> Result<FormField, CoreError> {
        let index = self.position(id)?;
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        self.dirty = true;
        Ok(self.fields.remove(index))
    }

    /// Move a field on the canvas. Returns `false` when it was dropped in place.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<bool, ValidationError> {
        let next = reorder(&self.fields, from, to)?;
        if from == to {
            return Ok(false);
        }
        self.fields = next;
        self.dirty = true;
        Ok(true)
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// The canvas as collection fields, in canvas order.
    pub fn to_fields(&self) -> Vec<NewField> {
        self.fields
            .iter()
            .map(|f| NewField {
                name: f.label.clone(),
                field_type: f.field_type,
                options: if f.field_type.uses_options() {
                    f.options.clone()
                } else {
                    Vec::new()
                },
                required: f.required,
            })
            .collect()
    }
}
