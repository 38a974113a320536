//! In-memory tables: typed values, records and the schema they share.

use chrono::NaiveDate;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{PipelineError, Result};

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
        }
    }
}

/// A single field value. `Missing` is the explicit missing-marker.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Missing,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the value. Only `Number` values are numeric; text is
    /// never parsed implicitly.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parses a literal the way a CLI flag or config default is written:
    /// empty is missing, a number is numeric, anything else is text.
    pub fn parse_literal(raw: &str) -> Value {
        if raw.is_empty() {
            Value::Missing
        } else if let Ok(n) = raw.trim().parse::<f64>() {
            Value::Number(n)
        } else {
            Value::Text(raw.to_string())
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Missing, Value::Missing) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Date(a), Value::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Missing => {}
            Value::Text(s) => s.hash(state),
            Value::Number(n) => {
                // -0.0 == 0.0 and NaN == NaN under our PartialEq
                let bits = if *n == 0.0 {
                    0u64
                } else if n.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::Date(d) => d.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{n}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Missing, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Missing => serializer.serialize_none(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
        }
    }
}

/// One row. Values are positional; the owning [`Table`] maps names to positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> &Value {
        &self.values[index]
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Ordered records sharing one schema. Every record has exactly one value per
/// field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    fields: Vec<String>,
    records: Vec<Record>,
}

impl Table {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            records: Vec::new(),
        }
    }

    /// Builds a table from rows, rejecting any row whose width differs from
    /// the schema.
    pub fn from_rows(fields: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Self::new(fields);
        for row in rows {
            table.push(row)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(PipelineError::RecordWidth {
                expected: self.fields.len(),
                found: values.len(),
            });
        }
        self.records.push(Record { values });
        Ok(())
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Record>) {
        (self.fields, self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Position of `field` in the schema.
    pub fn column_index(&self, field: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| PipelineError::UnknownField {
                field: field.to_string(),
                context: format!("table with fields {:?}", self.fields),
            })
    }

    pub fn value(&self, row: usize, field: &str) -> Result<&Value> {
        let idx = self.column_index(field)?;
        Ok(self.records[row].get(idx))
    }

    pub fn column(&self, field: &str) -> Result<Vec<&Value>> {
        let idx = self.column_index(field)?;
        Ok(self.records.iter().map(|r| r.get(idx)).collect())
    }

    /// Non-missing numeric values of `field`, in row order.
    pub fn numeric_values(&self, field: &str) -> Result<Vec<f64>> {
        let idx = self.column_index(field)?;
        Ok(self
            .records
            .iter()
            .filter_map(|r| r.get(idx).as_f64())
            .collect())
    }

    /// New table with the same schema holding the records `keep` accepts.
    pub fn filter<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&Record) -> bool,
    {
        Table {
            fields: self.fields.clone(),
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Stable sort, largest first. Non-numeric values sort last.
    pub fn sorted_desc(mut self, field: &str) -> Result<Table> {
        let idx = self.column_index(field)?;
        self.records.sort_by(|a, b| {
            match (a.get(idx).as_f64(), b.get(idx).as_f64()) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
        Ok(self)
    }
}

/// Serializes as a sequence of objects keyed by field name, in schema order.
impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        struct Row<'a> {
            fields: &'a [String],
            record: &'a Record,
        }

        impl Serialize for Row<'_> {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.fields.len()))?;
                for (name, value) in self.fields.iter().zip(self.record.values()) {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }

        let mut seq = serializer.serialize_seq(Some(self.records.len()))?;
        for record in &self.records {
            seq.serialize_element(&Row {
                fields: &self.fields,
                record,
            })?;
        }
        seq.end()
    }
}
