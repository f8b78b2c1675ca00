use corkboard_api::{CoreError, StorageEntity, Value};
use std::fmt;
use thiserror::Error;

/// Tables exposed by the persistence collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Collections,
    Fields,
    Statuses,
    Entries,
    EntryValues,
    Users,
    Comments,
    Documents,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::Collections,
        Table::Fields,
        Table::Statuses,
        Table::Entries,
        Table::EntryValues,
        Table::Users,
        Table::Comments,
        Table::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Collections => "collections",
            Table::Fields => "fields",
            Table::Statuses => "statuses",
            Table::Entries => "entries",
            Table::EntryValues => "entry_values",
            Table::Users => "users",
            Table::Comments => "comments",
            Table::Documents => "documents",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    IsNull(String),
    IsNotNull(String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn is_in(column: &str, values: Vec<Value>) -> Self {
        Filter::In(column.to_string(), values)
    }

    /// Evaluate the filter against a row. A missing column reads as `Null`.
    pub fn matches(&self, row: &StorageEntity) -> bool {
        let column = |name: &str| row.get(name).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(name, value) => column(name) == value,
            Filter::In(name, values) => values.contains(column(name)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
            Filter::IsNull(name) => column(name).is_null(),
            Filter::IsNotNull(name) => !column(name).is_null(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: false,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: true,
        }
    }
}

/// How joined rows relate to the queried row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKind {
    /// Rows of the joined table whose `foreign_key` equals the parent's `id`
    /// (entry_values under an entry).
    Children { foreign_key: String },
    /// The row of the joined table whose `id` equals the parent's `local_key`
    /// (the user under a comment).
    Parent { local_key: String },
}

/// One level of eager loading. Joined rows are attached to each result row under
/// `alias` as a `Value::Array` of `Value::Object`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: Table,
    pub alias: String,
    pub kind: JoinKind,
    pub order_by: Option<OrderBy>,
}

impl Join {
    pub fn children(table: Table, foreign_key: &str) -> Self {
        Self {
            table,
            alias: table.as_str().to_string(),
            kind: JoinKind::Children {
                foreign_key: foreign_key.to_string(),
            },
            order_by: None,
        }
    }

    pub fn parent(table: Table, local_key: &str, alias: &str) -> Self {
        Self {
            table,
            alias: alias.to_string(),
            kind: JoinKind::Parent {
                local_key: local_key.to_string(),
            },
            order_by: None,
        }
    }

    pub fn ordered_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub joins: Vec<Join>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }
}

/// Rows addressed by an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowTarget {
    Id(String),
    Ids(Vec<String>),
}

impl RowTarget {
    pub fn contains(&self, id: &str) -> bool {
        match self {
            RowTarget::Id(target) => target == id,
            RowTarget::Ids(targets) => targets.iter().any(|t| t == id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Row not found: {table} with id {id}")]
    NotFound { table: String, id: String },

    #[error("{table} row {id} is still referenced by {referenced_by}")]
    ForeignKeyConflict {
        table: String,
        id: String,
        referenced_by: String,
    },

    #[error("Duplicate {table} row for ({columns})")]
    UniqueViolation { table: String, columns: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { table, id } => CoreError::NotFound { entity: table, id },
            StorageError::ForeignKeyConflict { .. } => CoreError::ReferentialConflict {
                message: err.to_string(),
            },
            StorageError::Transport(message) => CoreError::Transport { message },
            other => CoreError::Transport {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(pairs: &[(&str, Value)]) -> StorageEntity {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<HashMap<_, _>>()
    }

    #[test]
    fn test_filter_matches() {
        let r = row(&[
            ("collection_id", Value::from("c1")),
            ("status_id", Value::Null),
        ]);

        assert!(Filter::eq("collection_id", "c1").matches(&r));
        assert!(!Filter::eq("collection_id", "c2").matches(&r));
        assert!(Filter::IsNull("status_id".into()).matches(&r));
        assert!(Filter::IsNull("assigned_to".into()).matches(&r));
        assert!(Filter::And(vec![
            Filter::eq("collection_id", "c1"),
            Filter::is_in("status_id", vec![Value::Null, Value::from("s1")]),
        ])
        .matches(&r));
        assert!(!Filter::Or(vec![Filter::IsNotNull("status_id".into())]).matches(&r));
    }

    #[test]
    fn test_storage_error_mapping() {
        let fk = StorageError::ForeignKeyConflict {
            table: "statuses".into(),
            id: "s1".into(),
            referenced_by: "entries".into(),
        };
        assert!(matches!(
            CoreError::from(fk),
            CoreError::ReferentialConflict { .. }
        ));
        assert_eq!(
            CoreError::from(StorageError::Transport("timeout".into())),
            CoreError::Transport {
                message: "timeout".into()
            }
        );
        assert_eq!(
            CoreError::from(StorageError::NotFound {
                table: "entries".into(),
                id: "e1".into()
            }),
            CoreError::not_found("entries", "e1")
        );
    }
}
