//! The closed set of field types a collection schema may use.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SchemaError;

/// Type tag of a collection field.
///
/// Stored as its lowercase tag (`"text"`, `"select"`, ...). Adding a type means adding
/// a variant here; every `match` over it in the registry then fails to compile until
/// the new type has parse/serialize/display/validate rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Select,
    Date,
    Checkbox,
    File,
    Number,
    User,
}

impl FieldType {
    pub const ALL: [FieldType; 7] = [
        FieldType::Text,
        FieldType::Select,
        FieldType::Date,
        FieldType::Checkbox,
        FieldType::File,
        FieldType::Number,
        FieldType::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Select => "select",
            FieldType::Date => "date",
            FieldType::Checkbox => "checkbox",
            FieldType::File => "file",
            FieldType::Number => "number",
            FieldType::User => "user",
        }
    }

    /// Parse a stored type tag.
    pub fn from_tag(tag: &str) -> Result<Self, SchemaError> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| SchemaError::UnknownFieldType {
                tag: tag.to_string(),
            })
    }

    /// Only select fields carry a meaningful option list.
    pub fn uses_options(&self) -> bool {
        matches!(self, FieldType::Select)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
