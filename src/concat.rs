//! Stacking several sources into one table.

use tracing::info;

use crate::error::{Diagnostics, PipelineError, Result, Warning};
use crate::table::{Table, Value};

/// Appends `sources` in order, optionally dropping each one's first column
/// (the index column the scraper writes).
///
/// The first source's fields are the reference. A later source with a
/// different field list raises a [`Warning::SchemaMismatch`] and is aligned
/// by name: reference fields it lacks become missing, extra fields are
/// dropped.
pub fn concatenate(
    sources: Vec<(String, Table)>,
    drop_first_column: bool,
    diag: &mut Diagnostics,
) -> Result<Table> {
    let mut reference: Option<Table> = None;

    for (name, table) in sources {
        let table = if drop_first_column {
            drop_first(&name, table)?
        } else {
            table
        };

        let Some(out) = reference.as_mut() else {
            info!(source = %name, fields = ?table.fields(), "Reference columns set");
            reference = Some(table);
            continue;
        };

        if table.fields() == out.fields() {
            let (_, records) = table.into_parts();
            for record in records {
                out.push(record.into_values())?;
            }
        } else {
            diag.push(Warning::SchemaMismatch {
                source_name: name.clone(),
                expected: out.fields().to_vec(),
                found: table.fields().to_vec(),
            });
            let mapping: Vec<Option<usize>> = out
                .fields()
                .iter()
                .map(|f| table.column_index(f).ok())
                .collect();
            for record in table.records() {
                let values = mapping
                    .iter()
                    .map(|m| m.map_or(Value::Missing, |i| record.get(i).clone()))
                    .collect();
                out.push(values)?;
            }
        }
        info!(source = %name, total_rows = out.len(), "Appended source");
    }

    reference.ok_or_else(|| PipelineError::InvalidConfig("no sources to concatenate".into()))
}

fn drop_first(name: &str, table: Table) -> Result<Table> {
    if table.fields().len() < 2 {
        return Err(PipelineError::EmptySource {
            source_name: name.to_string(),
            reason: "not enough columns to remove the first one".into(),
        });
    }
    let (fields, records) = table.into_parts();
    Table::from_rows(
        fields[1..].to_vec(),
        records
            .into_iter()
            .map(|r| r.into_values().split_off(1))
            .collect(),
    )
}
