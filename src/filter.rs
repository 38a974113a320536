//! Row selection by field value.

use serde::Deserialize;
use std::collections::HashSet;

use crate::error::{PipelineError, Result};
use crate::table::{Table, Value};

/// Neonicotinoid insecticides as named in residue reports.
pub const NEONICOTINOIDS: &[&str] = &[
    "Imidacloprid",
    "Thiamethoxam",
    "Clothianidin",
    "Acetamiprid",
    "Dinotefuran",
    "Nitenpyram",
    "Thiacloprid",
];

/// A condition on one field. Values compare by their written form, so
/// `"5"` matches both the text `5` and the number 5. Missing never matches
/// `Equals` or `OneOf`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Equals { field: String, value: String },
    OneOf { field: String, values: Vec<String> },
    NotMissing { field: String },
}

impl Predicate {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn one_of<S: AsRef<str>>(field: impl Into<String>, values: &[S]) -> Self {
        Predicate::OneOf {
            field: field.into(),
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }

    pub fn not_missing(field: impl Into<String>) -> Self {
        Predicate::NotMissing {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Predicate::Equals { field, .. }
            | Predicate::OneOf { field, .. }
            | Predicate::NotMissing { field } => field,
        }
    }
}

enum Compiled<'a> {
    Equals(usize, &'a str),
    OneOf(usize, HashSet<&'a str>),
    NotMissing(usize),
}

impl Compiled<'_> {
    fn matches(&self, values: &[Value]) -> bool {
        match self {
            Compiled::Equals(i, want) => {
                !values[*i].is_missing() && values[*i].to_string() == *want
            }
            Compiled::OneOf(i, set) => {
                !values[*i].is_missing() && set.contains(values[*i].to_string().as_str())
            }
            Compiled::NotMissing(i) => !values[*i].is_missing(),
        }
    }
}

/// Keeps the records that satisfy every predicate.
pub fn select(table: &Table, predicates: &[Predicate]) -> Result<Table> {
    let compiled = predicates
        .iter()
        .map(|p| {
            let idx = table.column_index(p.field())?;
            Ok::<_, PipelineError>(match p {
                Predicate::Equals { value, .. } => Compiled::Equals(idx, value),
                Predicate::OneOf { values, .. } => {
                    Compiled::OneOf(idx, values.iter().map(String::as_str).collect())
                }
                Predicate::NotMissing { .. } => Compiled::NotMissing(idx),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(table.filter(|r| compiled.iter().all(|c| c.matches(r.values()))))
}
