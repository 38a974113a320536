//! Per-field transformations: derive, coerce and clean individual columns.
//!
//! Every rule reads the *input* record, so the order of rules never changes
//! the result. A value that fails to coerce becomes [`Value::Missing`] and a
//! [`Warning::FieldCoercionFailure`] is recorded.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::error::{Diagnostics, PipelineError, Result, Warning};
use crate::table::{FieldType, Table, Value};

/// Date layouts seen in sighting exports and residue reports.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// `%Y` happily reads "23" as the year 23; such parses fall through to `%y`.
const MIN_YEAR: i32 = 1000;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transform {
    /// Keep the first `len` characters, e.g. the state code of a sample id.
    Prefix { len: usize },
    Uppercase,
    Lowercase,
    Trim,
    ParseNumber,
    ParseDate,
    /// `true` when the written value is one of `values`, else `false`.
    /// Missing is never a member.
    InSet { values: Vec<String> },
}

impl Transform {
    pub fn coercion(field_type: FieldType) -> Option<Transform> {
        match field_type {
            FieldType::Text => None,
            FieldType::Number => Some(Transform::ParseNumber),
            FieldType::Date => Some(Transform::ParseDate),
        }
    }

    pub fn in_set<S: AsRef<str>>(values: &[S]) -> Transform {
        Transform::InSet {
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }

    /// Applies this step. `Err` carries the text that failed to coerce.
    fn apply(&self, value: Value) -> std::result::Result<Value, String> {
        if let Transform::InSet { values } = self {
            let member = !value.is_missing() && values.contains(&value.to_string());
            return Ok(Value::Text(member.to_string()));
        }
        if value.is_missing() {
            return Ok(value);
        }
        match self {
            Transform::Prefix { len } => {
                let text = value.to_string();
                Ok(Value::Text(text.chars().take(*len).collect()))
            }
            Transform::Uppercase => Ok(map_text(value, |s| s.to_uppercase())),
            Transform::Lowercase => Ok(map_text(value, |s| s.to_lowercase())),
            Transform::Trim => Ok(map_text(value, |s| s.trim().to_string())),
            Transform::ParseNumber => match value {
                Value::Number(_) => Ok(value),
                Value::Text(s) => parse_number(&s).ok_or(s),
                other => Err(other.to_string()),
            },
            Transform::ParseDate => match value {
                Value::Date(_) => Ok(value),
                Value::Text(s) => parse_date(&s).ok_or(s),
                other => Err(other.to_string()),
            },
            Transform::InSet { .. } => Ok(value),
        }
    }

    fn target(&self) -> &'static str {
        match self {
            Transform::ParseDate => "date",
            Transform::ParseNumber => "number",
            _ => "text",
        }
    }
}

fn map_text(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::Text(s) => Value::Text(f(&s)),
        other => other,
    }
}

/// Parses a finite decimal number. Blank text is missing rather than a failure.
fn parse_number(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Value::Missing);
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(Value::Number(n)),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Value::Missing);
    }
    DATE_FORMATS
        .iter()
        .filter_map(|f| NaiveDate::parse_from_str(trimmed, f).ok())
        .chain(
            DATETIME_FORMATS
                .iter()
                .filter_map(|f| NaiveDateTime::parse_from_str(trimmed, f).ok())
                .map(|dt| dt.date()),
        )
        .find(|d| d.year() >= MIN_YEAR)
        .map(Value::Date)
}

/// A chain of transforms reading `field` and writing `into` (or `field`
/// itself when `into` is unset). A new `into` name appends a column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rule {
    pub field: String,
    #[serde(default)]
    pub into: Option<String>,
    pub steps: Vec<Transform>,
}

impl Rule {
    /// Transforms `field` in place.
    pub fn on(field: impl Into<String>, steps: Vec<Transform>) -> Self {
        Self {
            field: field.into(),
            into: None,
            steps,
        }
    }

    /// Derives `into` from `field`, leaving `field` untouched.
    pub fn derive(
        field: impl Into<String>,
        into: impl Into<String>,
        steps: Vec<Transform>,
    ) -> Self {
        Self {
            field: field.into(),
            into: Some(into.into()),
            steps,
        }
    }

    pub fn target(&self) -> &str {
        self.into.as_deref().unwrap_or(&self.field)
    }
}

/// Applies `rules` to every record of `table`, producing a new table.
///
/// Fails only on configuration problems: a rule reading an unknown field, or
/// two rules writing the same field.
pub fn normalize(table: &Table, rules: &[Rule], diag: &mut Diagnostics) -> Result<Table> {
    let mut fields = table.fields().to_vec();
    let mut plan = Vec::with_capacity(rules.len());

    for (i, rule) in rules.iter().enumerate() {
        let source = table.column_index(&rule.field)?;
        let target = rule.target();
        if rules[..i].iter().any(|r| r.target() == target) {
            return Err(PipelineError::InvalidConfig(format!(
                "more than one rule writes field '{target}'"
            )));
        }
        let dest = match fields.iter().position(|f| f == target) {
            Some(pos) => pos,
            None => {
                fields.push(target.to_string());
                fields.len() - 1
            }
        };
        plan.push((rule, source, dest));
    }

    let width = fields.len();
    let mut out = Table::new(fields);

    for (row, record) in table.records().iter().enumerate() {
        let mut values = record.values().to_vec();
        values.resize(width, Value::Missing);

        for (rule, source, dest) in &plan {
            let mut value = record.get(*source).clone();
            for step in &rule.steps {
                value = match step.apply(value) {
                    Ok(v) => v,
                    Err(raw) => {
                        diag.push(Warning::FieldCoercionFailure {
                            field: rule.target().to_string(),
                            row,
                            value: raw,
                            target: step.target(),
                        });
                        Value::Missing
                    }
                };
            }
            values[*dest] = value;
        }

        out.push(values)?;
    }

    Ok(out)
}

/// Coerces declared fields to their types. Text declarations are no-ops.
pub fn apply_types<'a, I>(table: &Table, types: I, diag: &mut Diagnostics) -> Result<Table>
where
    I: IntoIterator<Item = (&'a String, &'a FieldType)>,
{
    let rules: Vec<Rule> = types
        .into_iter()
        .filter_map(|(field, ty)| {
            Transform::coercion(*ty).map(|t| Rule::on(field.clone(), vec![t]))
        })
        .collect();
    if rules.is_empty() {
        return Ok(table.clone());
    }
    normalize(table, &rules, diag)
}
