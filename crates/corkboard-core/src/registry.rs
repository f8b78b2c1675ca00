//! Field type registry
//!
//! Every rule that depends on a field's type lives here as an exhaustive `match` over
//! [`FieldType`]: parsing the stored string, writing it back, formatting it for
//! read-only views and validating user input. Values are always persisted as
//! strings; `TypedValue` is the in-memory form.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use corkboard_api::{CoreError, Field, FieldType, ValidationError};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A parsed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Text(String),
    Select(String),
    Date(NaiveDate),
    Checkbox(bool),
    /// Storage path or URL of an uploaded file.
    File(String),
    Number(f64),
    /// User id.
    User(String),
}

impl TypedValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            TypedValue::Text(_) => FieldType::Text,
            TypedValue::Select(_) => FieldType::Select,
            TypedValue::Date(_) => FieldType::Date,
            TypedValue::Checkbox(_) => FieldType::Checkbox,
            TypedValue::File(_) => FieldType::File,
            TypedValue::Number(_) => FieldType::Number,
            TypedValue::User(_) => FieldType::User,
        }
    }
}

fn is_blank(raw: Option<&str>) -> bool {
    raw.map_or(true, |s| s.trim().is_empty())
}

fn invalid(expected: FieldType, raw: &str) -> CoreError {
    CoreError::InvalidFormat {
        expected,
        raw: raw.to_string(),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Parse a stored value.
///
/// Blank input is `None` for every type except checkbox, where `"true"` is true and
/// anything else (including null) is false. Unparsable dates and numbers fail with
/// `CoreError::InvalidFormat`.
pub fn parse(field_type: FieldType, raw: Option<&str>) -> Result<Option<TypedValue>, CoreError> {
    if field_type == FieldType::Checkbox {
        return Ok(Some(TypedValue::Checkbox(raw == Some("true"))));
    }
    let raw = match raw {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Ok(None),
    };
    let value = match field_type {
        FieldType::Text => TypedValue::Text(raw.to_string()),
        FieldType::Select => TypedValue::Select(raw.to_string()),
        FieldType::File => TypedValue::File(raw.to_string()),
        FieldType::User => TypedValue::User(raw.to_string()),
        FieldType::Date => {
            TypedValue::Date(parse_date(raw).ok_or_else(|| invalid(field_type, raw))?)
        }
        FieldType::Number => {
            TypedValue::Number(parse_number(raw).ok_or_else(|| invalid(field_type, raw))?)
        }
        FieldType::Checkbox => TypedValue::Checkbox(raw == "true"),
    };
    Ok(Some(value))
}

/// Canonical stored form of a value.
pub fn serialize(value: &TypedValue) -> String {
    match value {
        TypedValue::Text(s) | TypedValue::Select(s) | TypedValue::File(s) | TypedValue::User(s) => {
            s.clone()
        }
        TypedValue::Date(d) => d.format(DATE_FORMAT).to_string(),
        TypedValue::Checkbox(b) => (if *b { "true" } else { "false" }).to_string(),
        TypedValue::Number(n) => format_number(*n),
    }
}

/// Normalize raw input into its canonical stored form. `None` means nothing is stored.
pub fn normalize(field_type: FieldType, raw: Option<&str>) -> Result<Option<String>, CoreError> {
    if field_type == FieldType::Checkbox && raw.is_none() {
        return Ok(None);
    }
    Ok(parse(field_type, raw)?.as_ref().map(serialize))
}

/// Read-only rendering of a stored value. `Ok(None)` means the value is null and the
/// caller renders its empty placeholder. Checkboxes always render as `Yes`/`No`.
pub fn display(
    field_type: FieldType,
    raw: Option<&str>,
    date_format: &str,
) -> Result<Option<String>, CoreError> {
    let rendered = parse(field_type, raw)?.map(|value| match value {
        TypedValue::Date(d) => d.format(date_format).to_string(),
        TypedValue::Checkbox(true) => "Yes".to_string(),
        TypedValue::Checkbox(false) => "No".to_string(),
        TypedValue::File(path) => path
            .rsplit('/')
            .next()
            .unwrap_or(path.as_str())
            .to_string(),
        other => serialize(&other),
    });
    Ok(rendered)
}

/// Placeholder text shown for a value that failed to parse.
pub fn invalid_label(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Date => "Invalid Date",
        FieldType::Number => "Invalid Number",
        FieldType::Text
        | FieldType::Select
        | FieldType::Checkbox
        | FieldType::File
        | FieldType::User => "Invalid Value",
    }
}

/// Label used for a field type in the form-builder palette.
pub fn palette_label(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Text => "Text Input",
        FieldType::Select => "Select Dropdown",
        FieldType::Date => "Date Picker",
        FieldType::Checkbox => "Checkbox",
        FieldType::File => "File Upload",
        FieldType::Number => "Number Input",
        FieldType::User => "User Select",
    }
}

/// Validate user input for `field` before it is written.
pub fn validate(field: &Field, raw: Option<&str>) -> Result<(), ValidationError> {
    if is_blank(raw) {
        return if field.required {
            Err(ValidationError::MissingRequired {
                field: field.name.clone(),
            })
        } else {
            Ok(())
        };
    }
    let raw = raw.unwrap_or_default();
    let wrong_type = || ValidationError::WrongType {
        field: field.name.clone(),
        expected: field.field_type,
        value: raw.to_string(),
    };
    match field.field_type {
        FieldType::Text | FieldType::File | FieldType::User => Ok(()),
        FieldType::Select => {
            if field.options.iter().any(|o| o == raw) {
                Ok(())
            } else {
                Err(ValidationError::NotAnOption {
                    field: field.name.clone(),
                    value: raw.to_string(),
                })
            }
        }
        FieldType::Checkbox => match raw {
            "true" | "false" => Ok(()),
            _ => Err(wrong_type()),
        },
        FieldType::Date => parse_date(raw).map(|_| ()).ok_or_else(wrong_type),
        FieldType::Number => parse_number(raw).map(|_| ()).ok_or_else(wrong_type),
    }
}
