//! Raw per-page extraction output and consolidated canonical records.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::schema::CanonicalSchema;
use crate::error::{InvxError, Result};
use crate::matching::strip_code_fence;

/// Consolidated value of one canonical column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Not found on any page.
    Null,
    /// The same value on every page it appears on.
    Single(Value),
    /// Distinct values in first-seen order.
    Many(Vec<Value>),
}

impl FieldValue {
    /// Fold observed values: nulls are ignored, nested lists are flattened,
    /// duplicates are removed keeping first-seen order.
    pub fn fold<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let mut distinct: Vec<Value> = Vec::new();
        for value in values {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items.into_iter().filter(|v| !v.is_null()) {
                        push_distinct(&mut distinct, item);
                    }
                }
                other => push_distinct(&mut distinct, other),
            }
        }

        match distinct.len() {
            0 => FieldValue::Null,
            1 => FieldValue::Single(distinct.remove(0)),
            _ => FieldValue::Many(distinct),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// JSON form: `null`, the scalar, or the list.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Single(value) => value.clone(),
            FieldValue::Many(values) => Value::Array(values.clone()),
        }
    }

    /// Flat text for tabular output; lists are joined with " / ".
    pub fn to_display_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Single(value) => display_value(value),
            FieldValue::Many(values) => values
                .iter()
                .map(display_value)
                .collect::<Vec<_>>()
                .join(" / "),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_none(),
            FieldValue::Single(value) => value.serialize(serializer),
            FieldValue::Many(values) => values.serialize(serializer),
        }
    }
}

fn push_distinct(distinct: &mut Vec<Value>, value: Value) {
    if !distinct.contains(&value) {
        distinct.push(value);
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RecordField {
    name: String,
    key: String,
    value: FieldValue,
}

/// A record holding exactly one value per canonical column, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    fields: Vec<RecordField>,
}

impl CanonicalRecord {
    /// Record with every column set to null.
    pub fn empty(schema: &CanonicalSchema) -> Self {
        Self::build(schema, |_, _| FieldValue::Null)
    }

    /// Parse matched model output.
    ///
    /// The text must be a JSON object. Columns are looked up by name, then by
    /// machine key; missing columns become null and keys outside the schema
    /// are dropped.
    pub fn from_json_text(schema: &CanonicalSchema, text: &str) -> Result<Self> {
        let cleaned = strip_code_fence(text);
        let value: Value = serde_json::from_str(cleaned)
            .map_err(|e| InvxError::MalformedResponse(format!("not valid JSON: {}", e)))?;

        let Value::Object(object) = value else {
            return Err(InvxError::MalformedResponse(
                "expected a JSON object keyed by column name".to_string(),
            ));
        };

        for key in object.keys() {
            if schema.column(key).is_none() && !schema.keys().any(|k| k == key) {
                warn!("Dropping key outside the canonical schema: {}", key);
            }
        }

        Ok(Self::build(schema, |name, key| {
            let value = object.get(name).or_else(|| object.get(key)).cloned();
            FieldValue::fold(value)
        }))
    }

    /// Apply the fold rule locally to pages that already use canonical
    /// column names or machine keys.
    pub fn fold_pages(schema: &CanonicalSchema, pages: &[Map<String, Value>]) -> Self {
        Self::build(schema, |name, key| {
            FieldValue::fold(
                pages
                    .iter()
                    .filter_map(|page| page.get(name).or_else(|| page.get(key)).cloned()),
            )
        })
    }

    fn build<F>(schema: &CanonicalSchema, mut value_for: F) -> Self
    where
        F: FnMut(&str, &str) -> FieldValue,
    {
        let fields = schema
            .columns()
            .iter()
            .map(|column| RecordField {
                name: column.name.clone(),
                key: column.key.clone(),
                value: value_for(&column.name, &column.key),
            })
            .collect();
        Self { fields }
    }

    /// Value of a column, by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Value of a column, by machine key.
    pub fn get_by_key(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    /// `(column name, value)` pairs in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|f| (f.name.as_str(), &f.value))
    }

    /// Machine keys in schema order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no column has a value.
    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|f| f.value.is_null())
    }

    /// JSON object keyed by column name.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|f| (f.name.clone(), f.value.to_json()))
                .collect(),
        )
    }

    /// JSON object keyed by machine key.
    pub fn to_machine_keys(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|f| (f.key.clone(), f.value.to_json()))
                .collect(),
        )
    }
}

impl Serialize for CanonicalRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&field.name, &field.value)?;
        }
        map.end()
    }
}

/// Unstructured per-page output of a document extraction call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExtraction {
    pages: Vec<Map<String, Value>>,
}

impl RawExtraction {
    /// Parse a JSON array of page objects (a single object counts as one page).
    pub fn parse(text: &str) -> Result<Self> {
        let cleaned = strip_code_fence(text);
        let value: Value = serde_json::from_str(cleaned)
            .map_err(|e| InvxError::MalformedResponse(format!("not valid JSON: {}", e)))?;

        let pages = match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(page) => Ok(page),
                    other => Err(InvxError::MalformedResponse(format!(
                        "expected a page object, found {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            Value::Object(page) => vec![page],
            other => {
                return Err(InvxError::MalformedResponse(format!(
                    "expected an array of pages, found {}",
                    other
                )));
            }
        };

        Ok(Self { pages })
    }

    /// Pages in document order.
    pub fn pages(&self) -> &[Map<String, Value>] {
        &self.pages
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Append the pages of another extraction.
    pub fn extend(&mut self, other: RawExtraction) {
        self.pages.extend(other.pages);
    }
}
