//! Row representation used between source readers and target writers.
//!
//! Values are JSON: every driver picks a lossless JSON encoding of its
//! native values (text form for relational columns, `SELECT JSON` for CQL,
//! canonical Extended JSON for documents).

use serde_json::{Map, Value};

/// Ordered field map of a row.
pub type Fields = Map<String, Value>;

/// A single row plus the names of the fields forming its identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub fields: Fields,
    pub key: Vec<String>,
}

impl Row {
    pub fn new(fields: Fields, key: Vec<String>) -> Self {
        Self { fields, key }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Key field values in key order; missing fields yield `Null`.
    pub fn key_values(&self) -> Vec<(&str, &Value)> {
        self.key
            .iter()
            .map(|k| (k.as_str(), self.fields.get(k).unwrap_or(&Value::Null)))
            .collect()
    }
}

/// A batch of rows read from one container.
pub type Batch = Vec<Row>;
