use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::table::{Record, Table, Value};

/// Full outer join of aggregate tables on `key`.
///
/// Keys appear in first-encounter order across `tables`. Each source
/// contributes its non-key fields; a name already taken gets the source's
/// 1-based position appended (`Count`, `Count2`). Where a source lacks a key
/// every one of its fields is `default`.
pub fn combine(tables: &[Table], key: &str, default: &Value) -> Result<Table> {
    if tables.is_empty() {
        return Err(PipelineError::InvalidConfig("nothing to combine".into()));
    }

    let mut fields = vec![key.to_string()];
    let mut lookups: Vec<HashMap<&Value, &Record>> = Vec::with_capacity(tables.len());
    let mut columns: Vec<Vec<usize>> = Vec::with_capacity(tables.len());
    let mut order: Vec<&Value> = Vec::new();
    let mut seen: HashSet<&Value> = HashSet::new();

    for (pos, table) in tables.iter().enumerate() {
        let key_idx = table.column_index(key)?;

        let mut carried = Vec::new();
        for (i, name) in table.fields().iter().enumerate() {
            if i == key_idx {
                continue;
            }
            let out_name = if fields.contains(name) {
                format!("{name}{}", pos + 1)
            } else {
                name.clone()
            };
            if fields.contains(&out_name) {
                return Err(PipelineError::InvalidConfig(format!(
                    "field '{out_name}' from combine input #{} collides with an earlier field",
                    pos + 1
                )));
            }
            fields.push(out_name);
            carried.push(i);
        }

        let mut lookup = HashMap::with_capacity(table.len());
        for record in table.records() {
            let k = record.get(key_idx);
            if lookup.insert(k, record).is_some() {
                return Err(PipelineError::DuplicateKey {
                    key: k.to_string(),
                    input: pos + 1,
                });
            }
            if seen.insert(k) {
                order.push(k);
            }
        }

        lookups.push(lookup);
        columns.push(carried);
    }

    let mut out = Table::new(fields);
    for k in order {
        let mut row = vec![k.clone()];
        for (lookup, carried) in lookups.iter().zip(&columns) {
            match lookup.get(k) {
                Some(record) => row.extend(carried.iter().map(|&i| record.get(i).clone())),
                None => row.extend(carried.iter().map(|_| default.clone())),
            }
        }
        out.push(row)?;
    }

    debug!(inputs = tables.len(), keys = out.len(), "Combined tables");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(name: &str, rows: &[(&str, f64)]) -> Table {
        Table::from_rows(
            vec!["State".into(), name.into()],
            rows.iter()
                .map(|(s, n)| vec![Value::from(*s), Value::Number(*n)])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_outer_join_with_default() {
        let t1 = counts("Count", &[("TX", 5.0)]);
        let t2 = counts("Count", &[("NY", 2.0)]);
        let out = combine(&[t1, t2], "State", &Value::Number(0.0)).unwrap();

        assert_eq!(out.fields(), &["State", "Count", "Count2"]);
        assert_eq!(out.len(), 2);
        let rows: Vec<Vec<String>> = out
            .records()
            .iter()
            .map(|r| r.values().iter().map(|v| v.to_string()).collect())
            .collect();
        assert_eq!(rows, vec![vec!["TX", "5", "0"], vec!["NY", "0", "2"]]);
    }

    #[test]
    fn test_row_count_is_key_union() {
        let neonic = counts("Concentration", &[("CA", 0.4), ("OR", 0.1)]);
        let milkweed = counts("MilkweedCount", &[("OR", 12.0), ("TX", 30.0), ("CA", 2.0)]);
        let larva = counts("LarvaCount", &[("MN", 4.0)]);
        let out = combine(&[neonic, milkweed, larva], "State", &Value::Number(0.0)).unwrap();

        assert_eq!(out.len(), 4);
        assert_eq!(
            out.fields(),
            &["State", "Concentration", "MilkweedCount", "LarvaCount"]
        );
        assert_eq!(out.value(3, "State").unwrap(), &Value::from("MN"));
        assert_eq!(out.value(3, "MilkweedCount").unwrap(), &Value::Number(0.0));
        assert_eq!(out.value(0, "MilkweedCount").unwrap(), &Value::Number(2.0));
    }

    #[test]
    fn test_missing_default() {
        let t1 = counts("A", &[("TX", 1.0)]);
        let t2 = counts("B", &[("NY", 1.0)]);
        let out = combine(&[t1, t2], "State", &Value::Missing).unwrap();
        assert!(out.value(0, "B").unwrap().is_missing());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let t1 = counts("Count", &[("TX", 1.0), ("TX", 2.0)]);
        let err = combine(&[t1], "State", &Value::Number(0.0)).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateKey { input: 1, .. }));
    }

    #[test]
    fn test_key_must_exist() {
        let t1 = counts("Count", &[("TX", 1.0)]);
        let err = combine(&[t1], "Region", &Value::Number(0.0)).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownField { .. }));
    }
}
