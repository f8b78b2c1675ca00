//! Collection, schema and record types plus their row mappings.
//!
//! Each type converts to and from a [`StorageEntity`] row as exchanged with the
//! persistence collaborator. Column names follow the persisted tables
//! (`collections`, `fields`, `statuses`, `entries`, `entry_values`, `comments`, `users`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::SchemaError;
use crate::field_type::FieldType;
use crate::{StorageEntity, Value};

type RowResult<T> = std::result::Result<T, SchemaError>;

/// Which view a collection opens in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    Board,
    Table,
    Calendar,
}

impl ViewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::Board => "board",
            ViewType::Table => "table",
            ViewType::Calendar => "calendar",
        }
    }

    /// Parse a stored view tag. `kanban` is accepted as the legacy name of `board`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "board" | "kanban" => Some(ViewType::Board),
            "table" => Some(ViewType::Table),
            "calendar" => Some(ViewType::Calendar),
            _ => None,
        }
    }

    /// Board and calendar collections track workflow statuses.
    pub fn uses_statuses(&self) -> bool {
        matches!(self, ViewType::Board | ViewType::Calendar)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: String,
    pub view_type: ViewType,
    pub owner_id: String,
    #[serde(default)]
    pub form_definition: Vec<FormField>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub collection_id: String,
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub options: Vec<String>,
    pub required: bool,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub collection_id: String,
    pub name: String,
    pub color: String,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryValue {
    pub id: String,
    pub entry_id: String,
    pub field_id: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub collection_id: String,
    pub status_id: Option<String>,
    pub created_by: String,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub values: Vec<EntryValue>,
}

impl Entry {
    /// Raw stored value for a field. A missing EntryValue reads as null.
    pub fn value_of(&self, field_id: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.field_id == field_id)
            .and_then(|v| v.value.as_deref())
    }

    /// Insert or replace the value for `value.field_id`, keeping one value per field.
    pub fn upsert_value(&mut self, value: EntryValue) {
        match self
            .values
            .iter_mut()
            .find(|v| v.field_id == value.field_id)
        {
            Some(existing) => *existing = value,
            None => self.values.push(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub entry_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub user: Option<UserProfile>,
}

/// A file attached to a collection, and optionally to one of its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub collection_id: String,
    /// `None` for collection-level documents, or once the entry is gone.
    pub entry_id: Option<String>,
    pub name: String,
    pub content_type: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub size: i64,
    pub storage_path: String,
    pub url: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A field on the form-builder canvas. Lives only in the canvas working set until saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

// =============================================================================
// Row mapping
// =============================================================================

struct RowReader<'a> {
    entity: &'static str,
    row: &'a StorageEntity,
}

impl<'a> RowReader<'a> {
    fn new(entity: &'static str, row: &'a StorageEntity) -> Self {
        Self { entity, row }
    }

    fn malformed(&self, column: &str, reason: &str) -> SchemaError {
        SchemaError::MalformedRow {
            entity: self.entity.to_string(),
            column: column.to_string(),
            reason: reason.to_string(),
        }
    }

    fn string(&self, column: &str) -> RowResult<String> {
        self.opt_string(column)?
            .ok_or_else(|| self.malformed(column, "is missing"))
    }

    fn opt_string(&self, column: &str) -> RowResult<Option<String>> {
        match self.row.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.malformed(column, "is not a string")),
        }
    }

    fn integer(&self, column: &str) -> RowResult<i64> {
        self.row
            .get(column)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.malformed(column, "is not an integer"))
    }

    fn boolean(&self, column: &str) -> RowResult<bool> {
        match self.row.get(column) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Boolean(b)) => Ok(*b),
            Some(Value::Integer(i)) => Ok(*i != 0),
            Some(_) => Err(self.malformed(column, "is not a boolean")),
        }
    }

    fn string_list(&self, column: &str) -> RowResult<Vec<String>> {
        match self.row.get(column) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_string()
                        .map(str::to_string)
                        .ok_or_else(|| self.malformed(column, "contains a non-string item"))
                })
                .collect(),
            Some(_) => Err(self.malformed(column, "is not a list")),
        }
    }

    fn timestamp(&self, column: &str) -> RowResult<DateTime<Utc>> {
        let raw = self.string(column)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| self.malformed(column, "is not an RFC 3339 timestamp"))
    }

    fn nested_rows(&self, column: &str) -> RowResult<Vec<&'a StorageEntity>> {
        match self.row.get(column) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_object()
                        .ok_or_else(|| self.malformed(column, "contains a non-row item"))
                })
                .collect(),
            Some(Value::Object(obj)) => Ok(vec![obj]),
            Some(_) => Err(self.malformed(column, "is not a joined row set")),
        }
    }
}

fn timestamp_value(ts: &DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339())
}

impl Collection {
    pub fn from_row(row: &StorageEntity) -> RowResult<Self> {
        let r = RowReader::new("collection", row);
        let view_tag = r.string("view_type")?;
        let view_type = ViewType::from_tag(&view_tag)
            .ok_or_else(|| r.malformed("view_type", "is not a known view"))?;
        let form_definition = match row.get("form_definition") {
            None | Some(Value::Null) => Vec::new(),
            Some(v) => serde_json::from_value(serde_json::Value::from(v.clone()))
                .map_err(|e| r.malformed("form_definition", &e.to_string()))?,
        };
        Ok(Self {
            id: r.string("id")?,
            name: r.string("name")?,
            description: r.opt_string("description")?,
            icon: r.opt_string("icon")?.unwrap_or_default(),
            view_type,
            owner_id: r.string("owner_id")?,
            form_definition,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
        })
    }

    pub fn to_row(&self) -> StorageEntity {
        HashMap::from([
            ("id".to_string(), Value::from(self.id.as_str())),
            ("name".to_string(), Value::from(self.name.as_str())),
            ("description".to_string(), Value::from(self.description.clone())),
            ("icon".to_string(), Value::from(self.icon.as_str())),
            ("view_type".to_string(), Value::from(self.view_type.as_str())),
            ("owner_id".to_string(), Value::from(self.owner_id.as_str())),
            (
                "form_definition".to_string(),
                form_definition_value(&self.form_definition),
            ),
            ("created_at".to_string(), timestamp_value(&self.created_at)),
            ("updated_at".to_string(), timestamp_value(&self.updated_at)),
        ])
    }
}

/// Serialize a form definition into the column value stored on the collection row.
pub fn form_definition_value(fields: &[FormField]) -> Value {
    Value::Array(
        fields
            .iter()
            .map(|f| {
                serde_json::to_value(f)
                    .map(Value::from_json_value)
                    .unwrap_or(Value::Null)
            })
            .collect(),
    )
}

impl Field {
    /// Read a field row. Fails with `UnknownFieldType` when the stored tag is not one
    /// of the supported types.
    pub fn from_row(row: &StorageEntity) -> RowResult<Self> {
        let r = RowReader::new("field", row);
        Ok(Self {
            id: r.string("id")?,
            collection_id: r.string("collection_id")?,
            name: r.string("name")?,
            field_type: FieldType::from_tag(&r.string("type")?)?,
            options: r.string_list("options")?,
            required: r.boolean("required")?,
            order: r.integer("order")?,
        })
    }

    pub fn to_row(&self) -> StorageEntity {
        HashMap::from([
            ("id".to_string(), Value::from(self.id.as_str())),
            ("collection_id".to_string(), Value::from(self.collection_id.as_str())),
            ("name".to_string(), Value::from(self.name.as_str())),
            ("type".to_string(), Value::from(self.field_type.as_str())),
            ("options".to_string(), Value::from(self.options.clone())),
            ("required".to_string(), Value::Boolean(self.required)),
            ("order".to_string(), Value::Integer(self.order)),
        ])
    }
}

impl Status {
    pub fn from_row(row: &StorageEntity) -> RowResult<Self> {
        let r = RowReader::new("status", row);
        Ok(Self {
            id: r.string("id")?,
            collection_id: r.string("collection_id")?,
            name: r.string("name")?,
            color: r.opt_string("color")?.unwrap_or_default(),
            order: r.integer("order")?,
        })
    }

    pub fn to_row(&self) -> StorageEntity {
        HashMap::from([
            ("id".to_string(), Value::from(self.id.as_str())),
            ("collection_id".to_string(), Value::from(self.collection_id.as_str())),
            ("name".to_string(), Value::from(self.name.as_str())),
            ("color".to_string(), Value::from(self.color.as_str())),
            ("order".to_string(), Value::Integer(self.order)),
        ])
    }
}

impl EntryValue {
    pub fn from_row(row: &StorageEntity) -> RowResult<Self> {
        let r = RowReader::new("entry_value", row);
        Ok(Self {
            id: r.string("id")?,
            entry_id: r.string("entry_id")?,
            field_id: r.string("field_id")?,
            value: r.opt_string("value")?,
        })
    }
}

impl Entry {
    /// Read an entry row. Joined `entry_values` rows, when present, become `values`.
    pub fn from_row(row: &StorageEntity) -> RowResult<Self> {
        let r = RowReader::new("entry", row);
        let values = r
            .nested_rows("entry_values")?
            .into_iter()
            .map(EntryValue::from_row)
            .collect::<RowResult<Vec<_>>>()?;
        Ok(Self {
            id: r.string("id")?,
            collection_id: r.string("collection_id")?,
            status_id: r.opt_string("status_id")?,
            created_by: r.string("created_by")?,
            assigned_to: r.opt_string("assigned_to")?,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
            values,
        })
    }
}

impl UserProfile {
    pub fn from_row(row: &StorageEntity) -> RowResult<Self> {
        let r = RowReader::new("user", row);
        Ok(Self {
            id: r.string("id")?,
            email: r.opt_string("email")?.unwrap_or_default(),
            name: r.opt_string("name")?.unwrap_or_default(),
            role: r.opt_string("role")?,
        })
    }
}

impl Comment {
    /// Read a comment row. A joined `user` row, when present, becomes `user`.
    pub fn from_row(row: &StorageEntity) -> RowResult<Self> {
        let r = RowReader::new("comment", row);
        let user = r
            .nested_rows("user")?
            .into_iter()
            .next()
            .map(UserProfile::from_row)
            .transpose()?;
        Ok(Self {
            id: r.string("id")?,
            entry_id: r.string("entry_id")?,
            user_id: r.string("user_id")?,
            content: r.string("content")?,
            created_at: r.timestamp("created_at")?,
            user,
        })
    }
}

impl Document {
    pub fn from_row(row: &StorageEntity) -> RowResult<Self> {
        let r = RowReader::new("document", row);
        Ok(Self {
            id: r.string("id")?,
            collection_id: r.string("collection_id")?,
            entry_id: r.opt_string("entry_id")?,
            name: r.string("name")?,
            content_type: r.string("content_type")?,
            kind: r.opt_string("type")?,
            size: r.integer("size")?,
            storage_path: r.string("storage_path")?,
            url: r.opt_string("url")?,
            created_by: r.string("created_by")?,
            created_at: r.timestamp("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_row(tag: &str) -> StorageEntity {
        HashMap::from([
            ("id".to_string(), Value::from("f1")),
            ("collection_id".to_string(), Value::from("c1")),
            ("name".to_string(), Value::from("Priority")),
            ("type".to_string(), Value::from(tag)),
            ("options".to_string(), Value::from(vec!["Low", "High"])),
            ("required".to_string(), Value::Boolean(false)),
            ("order".to_string(), Value::Integer(1)),
        ])
    }

    #[test]
    fn test_field_row_mapping() {
        let field = Field::from_row(&field_row("select")).unwrap();
        assert_eq!(field.field_type, FieldType::Select);
        assert_eq!(field.options, vec!["Low".to_string(), "High".to_string()]);
        assert_eq!(Field::from_row(&field.to_row()).unwrap(), field);
    }

    #[test]
    fn test_field_row_with_unknown_type() {
        let err = Field::from_row(&field_row("rating")).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownFieldType { .. }));
    }

    #[test]
    fn test_entry_reads_joined_values() {
        let now = Utc::now().to_rfc3339();
        let value_row: StorageEntity = HashMap::from([
            ("id".to_string(), Value::from("v1")),
            ("entry_id".to_string(), Value::from("e1")),
            ("field_id".to_string(), Value::from("f1")),
            ("value".to_string(), Value::from("Fix sink")),
        ]);
        let row: StorageEntity = HashMap::from([
            ("id".to_string(), Value::from("e1")),
            ("collection_id".to_string(), Value::from("c1")),
            ("status_id".to_string(), Value::from("s1")),
            ("created_by".to_string(), Value::from("u1")),
            ("assigned_to".to_string(), Value::Null),
            ("created_at".to_string(), Value::from(now.clone())),
            ("updated_at".to_string(), Value::from(now)),
            (
                "entry_values".to_string(),
                Value::Array(vec![Value::Object(value_row)]),
            ),
        ]);

        let entry = Entry::from_row(&row).unwrap();
        assert_eq!(entry.value_of("f1"), Some("Fix sink"));
        assert_eq!(entry.value_of("f2"), None);
        assert_eq!(entry.assigned_to, None);
    }

    #[test]
    fn test_upsert_value_keeps_one_per_field() {
        let now = Utc::now();
        let mut entry = Entry {
            id: "e1".into(),
            collection_id: "c1".into(),
            status_id: None,
            created_by: "u1".into(),
            assigned_to: None,
            created_at: now,
            updated_at: now,
            values: vec![],
        };
        for text in ["a", "b"] {
            entry.upsert_value(EntryValue {
                id: format!("v-{}", text),
                entry_id: "e1".into(),
                field_id: "f1".into(),
                value: Some(text.into()),
            });
        }
        assert_eq!(entry.values.len(), 1);
        assert_eq!(entry.value_of("f1"), Some("b"));
    }

    #[test]
    fn test_view_type_accepts_kanban() {
        assert_eq!(ViewType::from_tag("kanban"), Some(ViewType::Board));
        assert!(ViewType::Board.uses_statuses());
        assert!(!ViewType::Table.uses_statuses());
    }
}
