//! Output formatting and persistence for tables.
//!
//! Supports pretty-printing to the log, CSV files and JSON files.

use csv::WriterBuilder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::table::Table;

/// Logs the first `limit` records of a table at debug level.
pub fn print_pretty(table: &Table, limit: usize) {
    debug!(fields = ?table.fields(), rows = table.len(), "Table preview");
    for record in table.records().iter().take(limit) {
        debug!("{:?}", record.values());
    }
}

/// Writes `table` to `path`: JSON when the extension is `.json`, CSV otherwise.
pub fn write_table(path: impl AsRef<Path>, table: &Table) -> Result<()> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let write_err = |reason: String| PipelineError::Write {
        path: path.display().to_string(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }
    let file = File::create(path).map_err(|e| write_err(e.to_string()))?;

    if is_json {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, table).map_err(|e| write_err(e.to_string()))?;
        writer.flush().map_err(|e| write_err(e.to_string()))?;
    } else {
        write_csv(file, table).map_err(|e| write_err(e.to_string()))?;
    }

    info!(path = %path.display(), rows = table.len(), json = is_json, "Wrote table");
    Ok(())
}

/// Writes CSV with a header row. Missing values are empty fields.
pub fn write_csv<W: Write>(writer: W, table: &Table) -> csv::Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(table.fields())?;
    for record in table.records() {
        writer.write_record(record.values().iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn sample() -> Table {
        Table::from_rows(
            vec!["State".into(), "Count".into()],
            vec![
                vec!["TX".into(), 5.0.into()],
                vec!["NY, upstate".into(), Value::Missing],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&sample(), 10);
    }

    #[test]
    fn test_write_csv_quotes_and_blanks() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &sample()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "State,Count\nTX,5\n\"NY, upstate\",\n");
    }

    #[test]
    fn test_header_written_for_empty_table() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &Table::new(vec!["State".into()])).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "State\n");
    }

    #[test]
    fn test_write_table_creates_file() {
        let path = temp_path("monarch_stats_test_create.csv");
        let _ = fs::remove_file(&path);

        write_table(&path, &sample()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("State,Count\n"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_table_json() {
        let path = temp_path("monarch_stats_test_write.json");
        let _ = fs::remove_file(&path);

        write_table(&path, &sample()).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed[0]["State"], "TX");
        assert_eq!(parsed[0]["Count"], 5.0);
        assert!(parsed[1]["Count"].is_null());

        fs::remove_file(&path).unwrap();
    }
}
