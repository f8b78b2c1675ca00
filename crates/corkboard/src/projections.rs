//! View projections
//!
//! Pure functions deriving what the board, table and calendar views show from a
//! collection schema and its entries. Nothing here mutates or talks to storage.

use chrono::NaiveDate;
use corkboard_api::{CoreError, Entry, Field, FieldType, Status};
use corkboard_core::{TypedValue, registry};

use crate::config::DisplayConfig;
use crate::schema::CollectionSchema;

/// A stored value that could not be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct CellIssue {
    pub entry_id: String,
    pub field_id: String,
    pub error: CoreError,
}

enum Rendered {
    Empty,
    Text(String),
    Invalid(CoreError),
}

fn render(field: &Field, entry: &Entry, display: &DisplayConfig) -> Rendered {
    match registry::display(field.field_type, entry.value_of(&field.id), &display.date_format) {
        Ok(Some(text)) => Rendered::Text(text),
        Ok(None) => Rendered::Empty,
        Err(error) => Rendered::Invalid(error),
    }
}

fn title(schema: &CollectionSchema, entry: &Entry, display: &DisplayConfig) -> String {
    schema
        .title_field()
        .and_then(|field| entry.value_of(&field.id))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(&display.untitled_label)
        .to_string()
}

// ============================================================================
// Board
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CardPreview {
    pub field_id: String,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub entry_id: String,
    pub title: String,
    pub previews: Vec<CardPreview>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardColumn {
    pub status: Status,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardProjection {
    pub columns: Vec<BoardColumn>,
    /// Entries whose status matches no column.
    pub unassigned: Vec<Card>,
}

fn card(schema: &CollectionSchema, entry: &Entry, display: &DisplayConfig) -> Card {
    let previews = schema
        .fields
        .iter()
        .skip(1)
        .take(display.card_preview_fields)
        .filter_map(|field| {
            let value = match render(field, entry, display) {
                Rendered::Text(text) => text,
                Rendered::Empty => return None,
                Rendered::Invalid(_) => registry::invalid_label(field.field_type).to_string(),
            };
            Some(CardPreview {
                field_id: field.id.clone(),
                label: field.name.clone(),
                value,
            })
        })
        .collect();
    Card {
        entry_id: entry.id.clone(),
        title: title(schema, entry, display),
        previews,
    }
}

/// One column per status in status order; cards keep the order of `entries`.
pub fn board(
    schema: &CollectionSchema,
    entries: &[Entry],
    display: &DisplayConfig,
) -> BoardProjection {
    let mut columns: Vec<BoardColumn> = schema
        .statuses
        .iter()
        .map(|status| BoardColumn {
            status: status.clone(),
            cards: Vec::new(),
        })
        .collect();
    let mut unassigned = Vec::new();
    for entry in entries {
        let column = entry
            .status_id
            .as_deref()
            .and_then(|id| columns.iter_mut().find(|c| c.status.id == id));
        let card = card(schema, entry, display);
        match column {
            Some(column) => column.cards.push(card),
            None => unassigned.push(card),
        }
    }
    BoardProjection {
        columns,
        unassigned,
    }
}

// ============================================================================
// Table
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    pub field_id: String,
    pub name: String,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub entry_id: String,
    /// Name of the entry's status, when the collection has statuses.
    pub status: Option<String>,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableProjection {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
    pub issues: Vec<CellIssue>,
}

pub fn table(
    schema: &CollectionSchema,
    entries: &[Entry],
    display: &DisplayConfig,
) -> TableProjection {
    let columns = schema
        .fields
        .iter()
        .map(|field| TableColumn {
            field_id: field.id.clone(),
            name: field.name.clone(),
            field_type: field.field_type,
        })
        .collect();

    let mut issues = Vec::new();
    let rows = entries
        .iter()
        .map(|entry| {
            let cells = schema
                .fields
                .iter()
                .map(|field| match render(field, entry, display) {
                    Rendered::Text(text) => text,
                    Rendered::Empty => display.empty_cell.clone(),
                    Rendered::Invalid(error) => {
                        issues.push(CellIssue {
                            entry_id: entry.id.clone(),
                            field_id: field.id.clone(),
                            error,
                        });
                        registry::invalid_label(field.field_type).to_string()
                    }
                })
                .collect();
            TableRow {
                entry_id: entry.id.clone(),
                status: entry
                    .status_id
                    .as_deref()
                    .and_then(|id| schema.status(id))
                    .map(|s| s.name.clone()),
                cells,
            }
        })
        .collect();

    TableProjection {
        columns,
        rows,
        issues,
    }
}

// ============================================================================
// Calendar
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub entry_id: String,
    pub title: String,
    pub date: NaiveDate,
    /// `YYYY-MM-DD`, used to bucket events into days.
    pub date_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalendarProjection {
    /// The collection has no date field to place entries with.
    NoDateField,
    Events {
        field_id: String,
        events: Vec<CalendarEvent>,
        issues: Vec<CellIssue>,
    },
}

impl CalendarProjection {
    pub fn events(&self) -> &[CalendarEvent] {
        match self {
            CalendarProjection::NoDateField => &[],
            CalendarProjection::Events { events, .. } => events,
        }
    }

    /// Events falling on `date`.
    pub fn on(&self, date: NaiveDate) -> impl Iterator<Item = &CalendarEvent> {
        self.events().iter().filter(move |e| e.date == date)
    }
}

/// Entries placed on the first date field. Entries without a date are left out;
/// entries with an unreadable date are left out and reported.
pub fn calendar(
    schema: &CollectionSchema,
    entries: &[Entry],
    display: &DisplayConfig,
) -> CalendarProjection {
    let Some(field) = schema.date_field() else {
        return CalendarProjection::NoDateField;
    };

    let mut events = Vec::new();
    let mut issues = Vec::new();
    for entry in entries {
        match registry::parse(FieldType::Date, entry.value_of(&field.id)) {
            Ok(Some(TypedValue::Date(date))) => events.push(CalendarEvent {
                entry_id: entry.id.clone(),
                title: title(schema, entry, display),
                date,
                date_key: date.format("%Y-%m-%d").to_string(),
            }),
            Ok(_) => {}
            Err(error) => {
                tracing::debug!(
                    "[Calendar] Skipping entry {} with unreadable date: {}",
                    entry.id,
                    error
                );
                issues.push(CellIssue {
                    entry_id: entry.id.clone(),
                    field_id: field.id.clone(),
                    error,
                });
            }
        }
    }
    events.sort_by_key(|e| e.date);

    CalendarProjection::Events {
        field_id: field.id.clone(),
        events,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use corkboard_api::{Collection, EntryValue, ViewType};

    fn field(id: &str, name: &str, field_type: FieldType, order: i64) -> Field {
        Field {
            id: id.into(),
            collection_id: "c".into(),
            name: name.into(),
            field_type,
            options: Vec::new(),
            required: order == 0,
            order,
        }
    }

    fn schema() -> CollectionSchema {
        let now = Utc::now();
        CollectionSchema {
            collection: Collection {
                id: "c".into(),
                name: "Plans".into(),
                description: None,
                icon: "📅".into(),
                view_type: ViewType::Calendar,
                owner_id: "u".into(),
                form_definition: Vec::new(),
                created_at: now,
                updated_at: now,
            },
            fields: vec![
                field("title", "Title", FieldType::Text, 0),
                field("due", "Due", FieldType::Date, 1),
                field("done", "Done", FieldType::Checkbox, 2),
                field("cost", "Cost", FieldType::Number, 3),
            ],
            statuses: vec![Status {
                id: "todo".into(),
                collection_id: "c".into(),
                name: "To do".into(),
                color: "#999".into(),
                order: 0,
            }],
            unreadable: Vec::new(),
            issues: Vec::new(),
        }
    }

    fn entry(id: &str, status: Option<&str>, values: &[(&str, &str)]) -> Entry {
        let now = Utc::now();
        Entry {
            id: id.into(),
            collection_id: "c".into(),
            status_id: status.map(String::from),
            created_by: "u".into(),
            assigned_to: None,
            created_at: now,
            updated_at: now,
            values: values
                .iter()
                .map(|(field, value)| EntryValue {
                    id: format!("{}-{}", id, field),
                    entry_id: id.into(),
                    field_id: field.to_string(),
                    value: Some(value.to_string()),
                })
                .collect(),
        }
    }

    #[test]
    fn test_board_columns_and_cards() {
        let entries = vec![
            entry("e1", Some("todo"), &[("title", "Book flights"), ("due", "2024-05-01")]),
            entry("e2", Some("gone"), &[]),
        ];
        let projection = board(&schema(), &entries, &DisplayConfig::default());

        assert_eq!(projection.columns.len(), 1);
        let card = &projection.columns[0].cards[0];
        assert_eq!(card.title, "Book flights");
        // Two previews after the title. An unset checkbox still reads as "No".
        let previews: Vec<(&str, &str)> = card
            .previews
            .iter()
            .map(|p| (p.label.as_str(), p.value.as_str()))
            .collect();
        assert_eq!(previews, vec![("Due", "2024-05-01"), ("Done", "No")]);
        assert_eq!(projection.unassigned[0].title, "Untitled");
    }

    #[test]
    fn test_table_cells() {
        let entries = vec![entry(
            "e1",
            Some("todo"),
            &[("title", "Hotel"), ("due", "soon"), ("done", "true")],
        )];
        let projection = table(&schema(), &entries, &DisplayConfig::default());

        assert_eq!(projection.columns.len(), 4);
        let row = &projection.rows[0];
        assert_eq!(row.status.as_deref(), Some("To do"));
        assert_eq!(row.cells, vec!["Hotel", "Invalid Date", "Yes", "-"]);
        assert_eq!(projection.issues.len(), 1);
        assert_eq!(projection.issues[0].field_id, "due");
    }

    #[test]
    fn test_calendar_events() {
        let entries = vec![
            entry("late", None, &[("title", "B"), ("due", "2024-06-02T09:30:00Z")]),
            entry("early", None, &[("title", "A"), ("due", "2024-06-01")]),
            entry("undated", None, &[("title", "C")]),
            entry("broken", None, &[("title", "D"), ("due", "whenever")]),
        ];
        let projection = calendar(&schema(), &entries, &DisplayConfig::default());

        let keys: Vec<&str> = projection
            .events()
            .iter()
            .map(|e| e.date_key.as_str())
            .collect();
        assert_eq!(keys, vec!["2024-06-01", "2024-06-02"]);
        let Some(day) = NaiveDate::from_ymd_opt(2024, 6, 2) else {
            panic!("valid date");
        };
        assert_eq!(projection.on(day).count(), 1);
        match projection {
            CalendarProjection::Events { issues, .. } => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].entry_id, "broken");
            }
            CalendarProjection::NoDateField => panic!("expected events"),
        }
    }

    #[test]
    fn test_calendar_without_date_field() {
        let mut schema = schema();
        schema.fields.retain(|f| f.field_type != FieldType::Date);
        assert_eq!(
            calendar(&schema, &[], &DisplayConfig::default()),
            CalendarProjection::NoDateField
        );
    }
}
