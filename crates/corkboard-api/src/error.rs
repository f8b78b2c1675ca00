//! User-facing error taxonomy.
//!
//! Every failure the core reports maps onto one [`ErrorKind`], which tells the
//! caller how to surface it: inline (validation), verbatim (referential conflict),
//! as a retry prompt (transport) or as a partial result (partial write).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::field_type::FieldType;
use crate::model::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    ReferentialConflict,
    TransportFailure,
    PartialWriteFailure,
    Schema,
    NotFound,
    Unauthenticated,
    Concurrency,
}

/// Which kind of named schema member a duplicate-name check refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamedKind {
    Field,
    Status,
}

impl fmt::Display for NamedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamedKind::Field => f.write_str("field"),
            NamedKind::Status => f.write_str("status"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SchemaError {
    #[error("Unknown field type '{tag}'")]
    UnknownFieldType { tag: String },

    #[error("Malformed {entity} row: column '{column}' {reason}")]
    MalformedRow {
        entity: String,
        column: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    #[error("'{field}' is required")]
    MissingRequired { field: String },

    #[error("'{value}' is not an option of '{field}'")]
    NotAnOption { field: String, value: String },

    #[error("'{field}' expects a {expected} value, got '{value}'")]
    WrongType {
        field: String,
        expected: FieldType,
        value: String,
    },

    #[error("Field {field_id} does not belong to this collection")]
    UnknownField { field_id: String },

    #[error("Status {status_id} does not belong to this collection")]
    UnknownStatus { status_id: String },

    #[error("A status is required because the collection defines statuses")]
    StatusRequired,

    #[error("Name cannot be empty")]
    EmptyName,

    #[error("A collection needs at least one field")]
    NoFields,

    #[error("The title field must stay required")]
    TitleMustBeRequired,

    #[error("Comment content cannot be empty")]
    EmptyComment,

    #[error("Sequence does not match the current items: {reason}")]
    SequenceMismatch { reason: String },

    #[error("Drag position out of range: {reason}")]
    InvalidGesture { reason: String },
}

/// Errors reported by schema, record and sync operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("A {kind} named '{name}' already exists in this collection")]
    DuplicateName { kind: NamedKind, name: String },

    #[error("Field {field_id} is the title field and cannot be removed")]
    ProtectedField { field_id: String },

    #[error("{message}")]
    StatusInUse { status_id: String, message: String },

    #[error("Referential conflict: {message}")]
    ReferentialConflict { message: String },

    #[error("Network error: {message}")]
    Transport { message: String },

    #[error("Entry {} was created but {message}", .entry.id)]
    PartialWrite { entry: Box<Entry>, message: String },

    #[error("The {kind} {id} was removed but the remaining orders were not compacted: {message}")]
    IncompleteRemoval {
        kind: NamedKind,
        id: String,
        message: String,
    },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid {expected} value: '{raw}'")]
    InvalidFormat { expected: FieldType, raw: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("User not authenticated")]
    Unauthenticated,

    #[error("A change on {surface} is still being saved")]
    MutationInFlight { surface: String },

    #[error("{surface} is closed")]
    SurfaceClosed { surface: String },
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_)
            | CoreError::DuplicateName { .. }
            | CoreError::ProtectedField { .. }
            | CoreError::InvalidFormat { .. } => ErrorKind::Validation,
            CoreError::StatusInUse { .. } | CoreError::ReferentialConflict { .. } => {
                ErrorKind::ReferentialConflict
            }
            CoreError::Transport { .. } => ErrorKind::TransportFailure,
            CoreError::PartialWrite { .. } | CoreError::IncompleteRemoval { .. } => {
                ErrorKind::PartialWriteFailure
            }
            CoreError::Schema(_) => ErrorKind::Schema,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Unauthenticated => ErrorKind::Unauthenticated,
            CoreError::MutationInFlight { .. } | CoreError::SurfaceClosed { .. } => {
                ErrorKind::Concurrency
            }
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        CoreError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Local errors are raised before anything is sent to the persistence collaborator.
    pub fn is_local(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::Schema | ErrorKind::Unauthenticated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            CoreError::ProtectedField {
                field_id: "f1".into()
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            CoreError::StatusInUse {
                status_id: "s1".into(),
                message: "fk".into()
            }
            .kind(),
            ErrorKind::ReferentialConflict
        );
        assert_eq!(
            CoreError::Transport {
                message: "timeout".into()
            }
            .kind(),
            ErrorKind::TransportFailure
        );
        assert_eq!(
            CoreError::IncompleteRemoval {
                kind: NamedKind::Field,
                id: "f2".into(),
                message: "down".into()
            }
            .kind(),
            ErrorKind::PartialWriteFailure
        );
        assert!(CoreError::from(ValidationError::EmptyName).is_local());
    }
}
