#![allow(dead_code)]

use anyhow::Result;
use corkboard::{
    CollectionSchema, Corkboard, CorkboardConfig, NewCollection, NewField, NewStatus, Session,
};
use corkboard::storage::MemoryBackend;
use corkboard_api::{FieldType, ViewType};

pub struct Fixture {
    pub engine: Corkboard,
    pub backend: MemoryBackend,
    pub session: Session,
}

impl Fixture {
    pub fn new() -> Self {
        let (engine, backend) = Corkboard::in_memory(CorkboardConfig::default());
        Self {
            engine,
            backend,
            session: Session::authenticated("user-1"),
        }
    }

    /// `[Title(text, required), Priority(select: Low, High)]` with statuses
    /// `[New, Done]`.
    pub async fn chores(&self) -> Result<CollectionSchema> {
        let created = self
            .engine
            .schema()
            .create_collection(
                &self.session,
                NewCollection {
                    name: "Chores".into(),
                    description: Some("Around the house".into()),
                    icon: "🧹".into(),
                    view_type: ViewType::Board,
                    fields: vec![
                        NewField::new("Title", FieldType::Text).required(),
                        NewField::new("Priority", FieldType::Select).with_options(&["Low", "High"]),
                    ],
                    statuses: vec![
                        NewStatus::new("New", "#94a3b8"),
                        NewStatus::new("Done", "#22c55e"),
                    ],
                },
            )
            .await?;
        Ok(self.engine.schema().load_collection(created.id()).await?)
    }

    /// A status-less collection with the given text fields, in order.
    pub async fn with_fields(&self, names: &[&str]) -> Result<CollectionSchema> {
        let created = self
            .engine
            .schema()
            .create_collection(
                &self.session,
                NewCollection {
                    name: "Reading list".into(),
                    description: None,
                    icon: "📚".into(),
                    view_type: ViewType::Table,
                    fields: names
                        .iter()
                        .map(|name| NewField::new(name, FieldType::Text))
                        .collect(),
                    statuses: Vec::new(),
                },
            )
            .await?;
        Ok(self.engine.schema().load_collection(created.id()).await?)
    }
}

pub fn field_id(schema: &CollectionSchema, name: &str) -> String {
    schema
        .fields
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.id.clone())
        .unwrap_or_else(|| panic!("no field named {}", name))
}

pub fn status_id(schema: &CollectionSchema, name: &str) -> String {
    schema
        .statuses
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.id.clone())
        .unwrap_or_else(|| panic!("no status named {}", name))
}
