//! Rows returned by a recipe, and tabular datasets built from them.

use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::value::Value;

/// One result row: values keyed by column label, in select order.
///
/// All rows of a result share the same `fields` allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeRow {
    fields: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl RecipeRow {
    /// Build a row. `values` must line up with `fields`.
    pub fn new(fields: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        debug_assert_eq!(fields.len(), values.len());
        Self { fields, values }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Look up a value by its column label.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .position(|f| f == field)
            .map(|i| &self.values[i])
    }

    /// Return a new row with extra labelled values appended.
    pub fn extend(&self, fields: Arc<Vec<String>>, extra: Vec<Value>) -> Self {
        let mut values = self.values.clone();
        values.extend(extra);
        Self::new(fields, values)
    }

    /// Replace a value in place. Unknown fields are ignored.
    pub fn set(&mut self, field: &str, value: Value) {
        if let Some(i) = self.fields.iter().position(|f| f == field) {
            self.values[i] = value;
        }
    }
}

impl Serialize for RecipeRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in self.fields.iter().zip(&self.values) {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Headers plus rows, exportable as CSV or JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Build a dataset from recipe rows. An empty result has no headers.
    pub fn from_rows(rows: &[RecipeRow]) -> Self {
        let headers = rows
            .first()
            .map(|r| r.fields().to_vec())
            .unwrap_or_default();
        Self {
            headers,
            rows: rows.iter().map(|r| r.values().to_vec()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as CSV with a header line. Fields are quoted when needed.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_csv_line(&mut out, self.headers.iter().map(String::as_str));
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(Value::to_string).collect();
            push_csv_line(&mut out, cells.iter().map(String::as_str));
        }
        out
    }

    /// Render as a JSON array of objects.
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = self
                    .headers
                    .iter()
                    .zip(row)
                    .map(|(h, v)| (h.clone(), serde_json::to_value(v).unwrap_or_default()))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

fn push_csv_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for cell in cells {
        if !first {
            out.push(',');
        }
        first = false;
        if cell.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}
