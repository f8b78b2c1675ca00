pub mod config;
pub mod documents;
pub mod engine;
pub mod form_builder;
pub mod logging;
pub mod projections;
pub mod records;
pub mod schema;
pub mod session;
pub mod storage;
pub mod sync;

pub use config::CorkboardConfig;
pub use documents::{DocumentStore, NewDocument};
pub use engine::Corkboard;
pub use form_builder::{FormCanvas, FormFieldPatch};
pub use records::{NewEntry, RecordStore, ValueMap};
pub use schema::{
    CollectionSchema, FieldPatch, NewCollection, NewField, NewStatus, SchemaService, StatusPatch,
    UnreadableField,
};
pub use session::{Session, StaticIdentity};
pub use sync::{BoardSurface, FieldOrderSurface, FormCanvasSurface, StatusOrderSurface};

pub use corkboard_api::{CoreError, ErrorKind};
pub use corkboard_core::{DragGesture, SyncNotice, SyncOutcome, SyncPhase};
