use std::collections::HashMap;
use tracing::debug;

use crate::analyzers::types::{Reduction, Summary};
use crate::analyzers::utility::{max, mean, median, min, sum};
use crate::error::{PipelineError, Result};
use crate::table::{Record, Table, Value};

/// Records grouped by key, in first-encounter order. A missing key value is a
/// key like any other.
struct Groups<'a> {
    keys: Vec<Vec<Value>>,
    members: Vec<Vec<&'a Record>>,
}

fn group<'a>(table: &'a Table, key_indices: &[usize]) -> Groups<'a> {
    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut groups = Groups {
        keys: Vec::new(),
        members: Vec::new(),
    };

    for record in table.records() {
        let key: Vec<Value> = key_indices.iter().map(|&i| record.get(i).clone()).collect();
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = groups.keys.len();
                index.insert(key.clone(), slot);
                groups.keys.push(key);
                groups.members.push(Vec::new());
                slot
            }
        };
        groups.members[slot].push(record);
    }

    groups
}

fn key_indices(table: &Table, keys: &[&str]) -> Result<Vec<usize>> {
    if keys.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "at least one grouping field is required".into(),
        ));
    }
    keys.iter().map(|k| table.column_index(k)).collect()
}

fn ensure_unique(names: &[String]) -> Result<()> {
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(PipelineError::InvalidConfig(format!(
                "output field '{name}' produced more than once; name the summaries explicitly"
            )));
        }
    }
    Ok(())
}

/// Groups `table` by `keys` and reduces each group with every summary.
///
/// Output schema is the key fields followed by one column per summary; one
/// row per distinct key combination, in first-encounter order.
pub fn aggregate(table: &Table, keys: &[&str], summaries: &[Summary]) -> Result<Table> {
    let key_idx = key_indices(table, keys)?;
    let summary_idx = summaries
        .iter()
        .map(|s| s.reduction.field().map(|f| table.column_index(f)).transpose())
        .collect::<Result<Vec<Option<usize>>>>()?;

    let mut fields: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    fields.extend(summaries.iter().map(Summary::output_name));
    ensure_unique(&fields)?;

    let groups = group(table, &key_idx);
    let mut out = Table::new(fields);

    for (key, members) in groups.keys.into_iter().zip(groups.members) {
        let mut row = key;
        for (summary, idx) in summaries.iter().zip(&summary_idx) {
            let values: Vec<f64> = match idx {
                Some(i) => members.iter().filter_map(|r| r.get(*i).as_f64()).collect(),
                None => Vec::new(),
            };
            let value = match summary.reduction {
                Reduction::Count => Value::Number(members.len() as f64),
                Reduction::Sum(_) => Value::Number(sum(&values)),
                Reduction::Mean(_) => mean(&values).into(),
                Reduction::Median(_) => median(&values).into(),
                Reduction::Max(_) => max(&values).into(),
                Reduction::Min(_) => min(&values).into(),
            };
            row.push(value);
        }
        out.push(row)?;
    }

    debug!(input_rows = table.len(), groups = out.len(), "Aggregated table");
    Ok(out)
}

/// Per group, the full record holding the largest value of `field`.
///
/// The first record in input order wins ties. Groups where `field` is missing
/// throughout are omitted.
pub fn max_records(table: &Table, keys: &[&str], field: &str) -> Result<Table> {
    let key_idx = key_indices(table, keys)?;
    let field_idx = table.column_index(field)?;
    let groups = group(table, &key_idx);

    let mut out = Table::new(table.fields().to_vec());
    for members in groups.members {
        let mut best: Option<(&Record, f64)> = None;
        for record in members {
            if let Some(v) = record.get(field_idx).as_f64() {
                // strict comparison keeps the earliest record on ties
                if best.is_none_or(|(_, b)| v > b) {
                    best = Some((record, v));
                }
            }
        }
        if let Some((record, _)) = best {
            out.push(record.values().to_vec())?;
        }
    }
    Ok(out)
}

/// Per group, the most frequent value of `field` and how often it occurs.
///
/// Output schema is the key fields, `field`, then `Count`. The value seen
/// first wins ties.
pub fn most_common(table: &Table, keys: &[&str], field: &str) -> Result<Table> {
    let key_idx = key_indices(table, keys)?;
    let field_idx = table.column_index(field)?;

    let mut fields: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    fields.push(field.to_string());
    fields.push("Count".to_string());
    ensure_unique(&fields)?;

    let groups = group(table, &key_idx);
    let mut out = Table::new(fields);

    for (key, members) in groups.keys.into_iter().zip(groups.members) {
        let mut counts: Vec<(&Value, usize)> = Vec::new();
        for record in &members {
            let v = record.get(field_idx);
            match counts.iter_mut().find(|(seen, _)| *seen == v) {
                Some((_, n)) => *n += 1,
                None => counts.push((v, 1)),
            }
        }
        let mut winner: Option<(&Value, usize)> = None;
        for (v, n) in counts {
            if winner.is_none_or(|(_, best)| n > best) {
                winner = Some((v, n));
            }
        }
        if let Some((value, count)) = winner {
            let mut row = key;
            row.push(value.clone());
            row.push(Value::Number(count as f64));
            out.push(row)?;
        }
    }
    Ok(out)
}
