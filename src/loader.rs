//! CSV loader producing [`Table`]s.

use csv::{ReaderBuilder, StringRecord};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Diagnostics, PipelineError, Result};
use crate::normalize::apply_types;
use crate::table::{FieldType, Table, Value};

/// Where field names come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HeaderMode {
    /// The first row is the header.
    #[default]
    Infer,
    /// The source has no header row; these are its field names.
    Explicit(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub header: HeaderMode,
    /// Declared field types, applied right after reading.
    pub types: BTreeMap<String, FieldType>,
    /// Minimum number of fields the source must declare. With explicit field
    /// names, the number of names is also a minimum.
    pub min_fields: usize,
}

impl LoadOptions {
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.header = HeaderMode::Explicit(columns);
        self
    }

    pub fn with_type(mut self, field: impl Into<String>, ty: FieldType) -> Self {
        self.types.insert(field.into(), ty);
        self
    }
}

/// Loads a CSV file.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_path(
    path: impl AsRef<Path>,
    opts: &LoadOptions,
    diag: &mut Diagnostics,
) -> Result<Table> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let file = File::open(path).map_err(|e| PipelineError::MissingSource {
        source_name: name.clone(),
        reason: e.to_string(),
    })?;
    let table = load_reader(file, &name, opts, diag)?;
    info!(rows = table.len(), fields = table.fields().len(), "Loaded source");
    Ok(table)
}

/// Loads CSV text from any reader. `name` labels errors and warnings.
pub fn load_reader<R: Read>(
    reader: R,
    name: &str,
    opts: &LoadOptions,
    diag: &mut Diagnostics,
) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let parse_err = |e: csv::Error| PipelineError::ParseFailure {
        source_name: name.to_string(),
        reason: e.to_string(),
    };
    let empty = |reason: String| PipelineError::EmptySource {
        source_name: name.to_string(),
        reason,
    };

    let mut records = rdr.records();
    let first = records
        .next()
        .transpose()
        .map_err(parse_err)?
        .ok_or_else(|| empty("no rows".into()))?;

    let (fields, mut rows) = match &opts.header {
        HeaderMode::Infer => {
            let header: Vec<String> = first.iter().map(str::to_string).collect();
            (header, Vec::new())
        }
        HeaderMode::Explicit(names) => {
            if first.len() < names.len() {
                return Err(empty(format!(
                    "{} fields declared, {} expected",
                    first.len(),
                    names.len()
                )));
            }
            (names.clone(), vec![first])
        }
    };

    if fields.len() < opts.min_fields.max(1) {
        return Err(empty(format!(
            "{} fields declared, at least {} expected",
            fields.len(),
            opts.min_fields.max(1)
        )));
    }
    for (i, f) in fields.iter().enumerate() {
        if fields[..i].contains(f) {
            return Err(PipelineError::ParseFailure {
                source_name: name.to_string(),
                reason: format!("duplicate column name '{f}'"),
            });
        }
    }

    for record in records {
        rows.push(record.map_err(parse_err)?);
    }
    if rows.is_empty() {
        return Err(empty("no data rows".into()));
    }

    let width = fields.len();
    let mut table = Table::new(fields);
    for (line, record) in rows.iter().enumerate() {
        let values = to_values(record, width).ok_or_else(|| PipelineError::ParseFailure {
            source_name: name.to_string(),
            reason: format!(
                "data row {} has {} fields, schema has {}",
                line + 1,
                record.len(),
                width
            ),
        })?;
        table.push(values)?;
    }

    for field in opts.types.keys() {
        if !table.has_field(field) {
            return Err(PipelineError::UnknownField {
                field: field.clone(),
                context: format!("source '{name}'"),
            });
        }
    }
    let table = apply_types(&table, &opts.types, diag)?;

    debug!(source = name, rows = table.len(), "Parsed CSV");
    Ok(table)
}

/// Short rows are padded with missing values; long rows are rejected.
fn to_values(record: &StringRecord, width: usize) -> Option<Vec<Value>> {
    if record.len() > width {
        return None;
    }
    let mut values: Vec<Value> = record
        .iter()
        .map(|s| {
            if s.is_empty() {
                Value::Missing
            } else {
                Value::Text(s.to_string())
            }
        })
        .collect();
    values.resize(width, Value::Missing);
    Some(values)
}
