//! Furniture search conditions: schema, validation and the session table.
//!
//! A draft is a loose `key → value` map filled in by the form (or read from
//! JSON). [`validate`] turns it into a [`ConditionRecord`] when every schema
//! field is present with the right value shape. Option membership and range
//! bounds are not checked.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use interior_shared::{CatalogConfig, InteriorError, default_catalog_fields};

pub use interior_shared::{ChoiceGroup, FieldKind, FieldSpec};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a draft was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("{key} is required")]
    Missing { key: String },

    #[error("{key} must be a range with low <= high")]
    InvalidRange { key: String },

    #[error("{key} must have at least one option selected")]
    InvalidList { key: String },

    #[error("{key} must be text")]
    InvalidText { key: String },
}

/// Why a table edit was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("select the rows to delete")]
    NothingSelected,

    #[error("row {index} does not exist (table has {len} rows)")]
    IndexOutOfRange { index: usize, len: usize },
}

impl From<ConditionError> for InteriorError {
    fn from(e: ConditionError) -> Self {
        InteriorError::validation(e.to_string())
    }
}

impl From<TableError> for InteriorError {
    fn from(e: TableError) -> Self {
        InteriorError::validation(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Ordered list of condition fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionSchema {
    pub fields: Vec<FieldSpec>,
}

impl Default for ConditionSchema {
    fn default() -> Self {
        Self {
            fields: default_catalog_fields(),
        }
    }
}

impl ConditionSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Schema from the `[catalog]` config section.
    pub fn from_config(catalog: &CatalogConfig) -> Self {
        Self::new(catalog.fields.clone())
    }

    /// Column headers, in field order.
    pub fn headers(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.label.clone()).collect()
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// A single value in a condition draft.
///
/// Deserialized untagged: a string is `Text`, a two-number array is `Range`,
/// a string array is `List`, anything else is kept as `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Text(String),
    Range(i64, i64),
    List(Vec<String>),
    Other(serde_json::Value),
}

impl ConditionValue {
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Form input keyed by field key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionDraft(BTreeMap<String, ConditionValue>);

impl ConditionDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: ConditionValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: ConditionValue) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ConditionValue> {
        self.0.get(key)
    }

    /// Parse a JSON object into a draft.
    pub fn from_json(json: &str) -> interior_shared::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| InteriorError::parse(format!("condition JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A validated condition row: one rendered cell per schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionRecord {
    pub cells: Vec<String>,
}

/// Validate `draft` against `schema`.
///
/// Fields are checked in schema order and the first problem is returned.
/// Keys not in the schema are ignored.
pub fn validate(
    schema: &ConditionSchema,
    draft: &ConditionDraft,
) -> Result<ConditionRecord, ConditionError> {
    let result = schema
        .fields
        .iter()
        .map(|field| render_cell(field, draft.get(&field.key)))
        .collect::<Result<Vec<_>, _>>();

    match result {
        Ok(cells) => Ok(ConditionRecord { cells }),
        Err(e) => {
            warn!(error = %e, "condition rejected");
            Err(e)
        }
    }
}

fn render_cell(field: &FieldSpec, value: Option<&ConditionValue>) -> Result<String, ConditionError> {
    let key = || field.key.clone();
    let Some(value) = value else {
        return Err(ConditionError::Missing { key: key() });
    };

    match (&field.kind, value) {
        (FieldKind::Range { .. }, ConditionValue::Range(low, high)) if low <= high => {
            Ok(format!("{low} - {high} mm"))
        }
        (FieldKind::Range { .. }, _) => Err(ConditionError::InvalidRange { key: key() }),

        (FieldKind::Choices { .. } | FieldKind::Cascade { .. }, ConditionValue::List(items))
            if !items.is_empty() =>
        {
            Ok(items.join(", "))
        }
        (FieldKind::Choices { .. } | FieldKind::Cascade { .. }, _) => {
            Err(ConditionError::InvalidList { key: key() })
        }

        (FieldKind::Text, ConditionValue::Text(text)) => Ok(text.clone()),
        (FieldKind::Text, _) => Err(ConditionError::InvalidText { key: key() }),
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Saved conditions for the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionTable {
    headers: Vec<String>,
    rows: Vec<ConditionRecord>,
}

impl ConditionTable {
    /// Empty table with headers from `schema`.
    pub fn new(schema: &ConditionSchema) -> Self {
        Self {
            headers: schema.headers(),
            rows: Vec::new(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[ConditionRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, record: ConditionRecord) {
        self.rows.push(record);
    }

    /// Remove the rows at `indices`; the rest keep their order.
    ///
    /// Nothing is removed if any index is out of range.
    pub fn delete(&mut self, indices: &[usize]) -> Result<(), TableError> {
        if indices.is_empty() {
            return Err(TableError::NothingSelected);
        }

        let doomed: BTreeSet<usize> = indices.iter().copied().collect();
        if let Some(&index) = doomed.iter().find(|&&i| i >= self.rows.len()) {
            return Err(TableError::IndexOutOfRange {
                index,
                len: self.rows.len(),
            });
        }

        let mut position = 0;
        self.rows.retain(|_| {
            let keep = !doomed.contains(&position);
            position += 1;
            keep
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_draft() -> ConditionDraft {
        ConditionDraft::new()
            .with("taste", ConditionValue::list(["ナチュラル"]))
            .with("lead_time", ConditionValue::list(["在庫品", "3週間"]))
            .with("price_tier", ConditionValue::list(["Middle"]))
            .with("category", ConditionValue::list(["1人掛けソファ"]))
            .with("width", ConditionValue::Range(500, 1000))
            .with("depth", ConditionValue::Range(500, 900))
            .with("height", ConditionValue::Range(600, 800))
            .with("seat_height", ConditionValue::Range(400, 450))
    }

    fn record(tag: &str) -> ConditionRecord {
        ConditionRecord {
            cells: vec![tag.to_string()],
        }
    }

    fn table_with(tags: &[&str]) -> ConditionTable {
        let mut table = ConditionTable::new(&ConditionSchema::default());
        for tag in tags {
            table.push(record(tag));
        }
        table
    }

    fn tags(table: &ConditionTable) -> Vec<&str> {
        table.rows().iter().map(|r| r.cells[0].as_str()).collect()
    }

    #[test]
    fn complete_draft_is_rendered_in_schema_order() {
        let record = validate(&ConditionSchema::default(), &full_draft()).unwrap();
        assert_eq!(
            record.cells,
            vec![
                "ナチュラル",
                "在庫品, 3週間",
                "Middle",
                "1人掛けソファ",
                "500 - 1000 mm",
                "500 - 900 mm",
                "600 - 800 mm",
                "400 - 450 mm",
            ]
        );
    }

    #[test]
    fn missing_field_is_rejected() {
        let mut draft = full_draft();
        draft.0.remove("price_tier");
        assert_eq!(
            validate(&ConditionSchema::default(), &draft),
            Err(ConditionError::Missing {
                key: "price_tier".into()
            })
        );
    }

    #[test]
    fn empty_selection_is_rejected() {
        let draft = full_draft().with("taste", ConditionValue::List(Vec::new()));
        assert_eq!(
            validate(&ConditionSchema::default(), &draft),
            Err(ConditionError::InvalidList {
                key: "taste".into()
            })
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        let draft = full_draft().with("depth", ConditionValue::Range(900, 500));
        assert_eq!(
            validate(&ConditionSchema::default(), &draft),
            Err(ConditionError::InvalidRange {
                key: "depth".into()
            })
        );
    }

    #[test]
    fn equal_bounds_are_accepted() {
        let draft = full_draft().with("width", ConditionValue::Range(700, 700));
        let record = validate(&ConditionSchema::default(), &draft).unwrap();
        assert_eq!(record.cells[4], "700 - 700 mm");
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let draft = full_draft().with("height", ConditionValue::Text("tall".into()));
        assert!(matches!(
            validate(&ConditionSchema::default(), &draft),
            Err(ConditionError::InvalidRange { .. })
        ));

        let draft = full_draft().with("taste", ConditionValue::Range(1, 2));
        assert!(matches!(
            validate(&ConditionSchema::default(), &draft),
            Err(ConditionError::InvalidList { .. })
        ));
    }

    #[test]
    fn membership_and_bounds_are_not_checked() {
        let draft = full_draft()
            .with("taste", ConditionValue::list(["Mid-century"]))
            .with("width", ConditionValue::Range(-50, 99_999));
        assert!(validate(&ConditionSchema::default(), &draft).is_ok());
    }

    #[test]
    fn extra_keys_are_ignored() {
        let draft = full_draft().with("colour", ConditionValue::Text("red".into()));
        assert!(validate(&ConditionSchema::default(), &draft).is_ok());
    }

    #[test]
    fn text_fields_require_text() {
        let schema = ConditionSchema::new(vec![FieldSpec::new("note", "Note", FieldKind::Text)]);
        let ok = ConditionDraft::new().with("note", ConditionValue::Text("quiet".into()));
        assert_eq!(validate(&schema, &ok).unwrap().cells, vec!["quiet"]);

        let bad = ConditionDraft::new().with("note", ConditionValue::list(["quiet"]));
        assert_eq!(
            validate(&schema, &bad),
            Err(ConditionError::InvalidText { key: "note".into() })
        );
    }

    #[test]
    fn draft_from_json_shapes() {
        let draft = ConditionDraft::from_json(
            r#"{"taste": ["ナチュラル"], "width": [0, 800], "note": "x", "bad": [1, 2, 3]}"#,
        )
        .unwrap();
        assert_eq!(draft.get("taste"), Some(&ConditionValue::list(["ナチュラル"])));
        assert_eq!(draft.get("width"), Some(&ConditionValue::Range(0, 800)));
        assert_eq!(draft.get("note"), Some(&ConditionValue::Text("x".into())));
        assert!(matches!(draft.get("bad"), Some(ConditionValue::Other(_))));
    }

    #[test]
    fn draft_from_invalid_json_is_parse_error() {
        assert!(matches!(
            ConditionDraft::from_json("[1, 2"),
            Err(InteriorError::Parse { .. })
        ));
    }

    #[test]
    fn headers_follow_schema_order() {
        let table = ConditionTable::new(&ConditionSchema::default());
        assert_eq!(
            table.headers(),
            &[
                "Taste",
                "Lead time",
                "Price tier",
                "Category",
                "Width",
                "Depth",
                "Height",
                "Seat height"
            ]
        );
    }

    #[test]
    fn delete_removes_exactly_selected_rows() {
        let mut table = table_with(&["a", "b", "c", "d", "e"]);
        table.delete(&[3, 1]).unwrap();
        assert_eq!(tags(&table), vec!["a", "c", "e"]);

        table.delete(&[0]).unwrap();
        assert_eq!(tags(&table), vec!["c", "e"]);
    }

    #[test]
    fn delete_collapses_duplicates() {
        let mut table = table_with(&["a", "b", "c"]);
        table.delete(&[1, 1, 1]).unwrap();
        assert_eq!(tags(&table), vec!["a", "c"]);
    }

    #[test]
    fn delete_out_of_range_leaves_table_unchanged() {
        let mut table = table_with(&["a", "b", "c"]);
        assert_eq!(
            table.delete(&[0, 3]),
            Err(TableError::IndexOutOfRange { index: 3, len: 3 })
        );
        assert_eq!(tags(&table), vec!["a", "b", "c"]);
    }

    #[test]
    fn delete_requires_selection() {
        let mut table = table_with(&["a"]);
        assert_eq!(table.delete(&[]), Err(TableError::NothingSelected));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn errors_convert_to_validation() {
        let err: InteriorError = TableError::NothingSelected.into();
        assert!(matches!(err, InteriorError::Validation { .. }));
    }
}
