use std::path::{Path, PathBuf};
use tracing::info;

use crate::analyzers::aggregate::{aggregate, max_records, most_common};
use crate::analyzers::combine::combine;
use crate::analyzers::outlier::filter_outliers;
use crate::analyzers::types::{OutlierMode, ReductionKind, Summary};
use crate::concat::concatenate;
use crate::config::{PipelineConfig, RunConfig};
use crate::error::{Diagnostics, PipelineError, Result};
use crate::filter::select;
use crate::loader::{LoadOptions, load_path};
use crate::normalize::{Rule, Transform, normalize};
use crate::output::{print_pretty, write_table};
use crate::table::{FieldType, Table, Value};

/// Whether the pipeline reads `field` as a number.
fn uses_numeric_field(config: &PipelineConfig) -> bool {
    match config.reduction {
        ReductionKind::MostCommon => false,
        ReductionKind::Count => config.remove_outliers && config.field.is_some(),
        _ => true,
    }
}

/// Loads every input and stacks them.
fn load_inputs(
    inputs: &[PathBuf],
    opts: &LoadOptions,
    drop_first_column: bool,
    diag: &mut Diagnostics,
) -> Result<Table> {
    let mut sources = Vec::with_capacity(inputs.len());
    for path in inputs {
        let table = load_path(path, opts, diag)?;
        sources.push((path.display().to_string(), table));
    }
    concatenate(sources, drop_first_column, diag)
}

/// Runs one load → normalize → filter → outliers → aggregate pipeline and
/// writes the result when the config names an output.
#[tracing::instrument(skip_all, fields(pipeline = %config.label()))]
pub fn run_pipeline(config: &PipelineConfig, diag: &mut Diagnostics) -> Result<Table> {
    config.validate()?;
    let numeric = uses_numeric_field(config);
    if let (true, Some(field)) = (numeric, &config.field) {
        if let Some(ty) = config.declared_type(field).filter(|t| *t != FieldType::Number) {
            return Err(PipelineError::InvalidConfig(format!(
                "field '{field}' is declared {} but the pipeline needs a number",
                ty.name()
            )));
        }
    }

    let table = load_inputs(
        &config.inputs,
        &config.load_options(),
        config.drop_first_column,
        diag,
    )?;
    let mut table = normalize(&table, &config.rules, diag)?;

    // Fields derived by rules are not known at load time, so numeric
    // coercion of the reduction field happens here.
    if let (true, Some(field)) = (numeric, &config.field) {
        table = normalize(&table, &[Rule::on(field, vec![Transform::ParseNumber])], diag)?;
    }

    let table = select(&table, &config.filters)?;
    info!(rows = table.len(), "Rows after filtering");

    let table = match &config.field {
        Some(field) if numeric && config.remove_outliers => {
            filter_outliers(&table, field, config.outlier_mode)?
        }
        _ => table,
    };

    let keys: Vec<&str> = config.group_by.iter().map(String::as_str).collect();
    let field = config.field.as_deref();
    let (result, sort_by) = match config.reduction.summary(field) {
        Some(reduction) => {
            let mut summary = Summary::new(reduction);
            if let Some(name) = &config.summary_name {
                summary = summary.named(name);
            }
            let sort_by = summary.output_name();
            (aggregate(&table, &keys, &[summary])?, sort_by)
        }
        None => {
            let field = field.unwrap_or_default();
            match config.reduction {
                ReductionKind::MaxRecord => {
                    (max_records(&table, &keys, field)?, field.to_string())
                }
                _ => (most_common(&table, &keys, field)?, "Count".to_string()),
            }
        }
    };
    let result = normalize(&result, &config.annotate, diag)?;
    let result = if config.sort {
        result.sorted_desc(&sort_by)?
    } else {
        result
    };

    print_pretty(&result, 10);
    if let Some(output) = &config.output {
        write_table(output, &result)?;
    }
    info!(groups = result.len(), "Pipeline complete");
    Ok(result)
}

/// Runs every pipeline of `config`, then the combine step if one is set.
///
/// Returns the combined table, or `None` when there is no combine step.
#[tracing::instrument(skip_all, fields(pipelines = config.pipelines.len()))]
pub fn run(config: &RunConfig, diag: &mut Diagnostics) -> Result<Option<Table>> {
    config.validate()?;

    let mut tables = Vec::with_capacity(config.pipelines.len());
    for pipeline in &config.pipelines {
        tables.push(run_pipeline(pipeline, diag)?);
    }

    let Some(step) = &config.combine else {
        return Ok(None);
    };
    let combined = combine(&tables, &step.key, &step.default_value()?)?;
    write_table(&step.output, &combined)?;
    info!(keys = combined.len(), output = %step.output.display(), "Combined pipelines");
    Ok(Some(combined))
}

/// Drops outlier rows of `field` from `input` and writes the rest to `output`.
#[tracing::instrument(skip(diag))]
pub fn clean_file(
    input: &Path,
    output: &Path,
    field: &str,
    mode: OutlierMode,
    diag: &mut Diagnostics,
) -> Result<Table> {
    let opts = LoadOptions::default().with_type(field, FieldType::Number);
    let table = load_path(input, &opts, diag)?;
    let cleaned = filter_outliers(&table, field, mode)?;
    write_table(output, &cleaned)?;
    info!(
        kept = cleaned.len(),
        removed = table.len() - cleaned.len(),
        "Cleaned data saved"
    );
    Ok(cleaned)
}

/// Concatenates CSV files, optionally dropping each file's first column.
#[tracing::instrument(skip(diag))]
pub fn concat_files(
    inputs: &[PathBuf],
    output: &Path,
    drop_first_column: bool,
    diag: &mut Diagnostics,
) -> Result<Table> {
    let opts = LoadOptions {
        min_fields: if drop_first_column { 2 } else { 1 },
        ..Default::default()
    };
    let table = load_inputs(inputs, &opts, drop_first_column, diag)?;
    write_table(output, &table)?;
    Ok(table)
}

/// Outer-joins aggregate CSV files on `key`.
#[tracing::instrument(skip(diag))]
pub fn combine_files(
    inputs: &[PathBuf],
    output: &Path,
    key: &str,
    default: &Value,
    diag: &mut Diagnostics,
) -> Result<Table> {
    let mut tables = Vec::with_capacity(inputs.len());
    for path in inputs {
        tables.push(load_path(path, &LoadOptions::default(), diag)?);
    }
    let combined = combine(&tables, key, default)?;
    write_table(output, &combined)?;
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Predicate;
    use std::env;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("monarch_stats_analyzer_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const LARVA: &str = "Index,Date,Town,State/Province,Latitude,Longitude,Number,Image\n\
        0,03/01/2024,Austin,TX,30.2,-97.7,4,1\n\
        1,03/02/2024,Waco,tx,31.5,-97.1,2,0\n\
        2,03/04/2024,Tulsa,OK,36.1,-95.9,3,0\n\
        3,03/05/2024,Norman,OK,35.2,-97.4,5,1\n\
        4,03/06/2024,Dallas,TX,32.7,-96.8,900,0\n";

    #[test]
    fn test_sum_by_state_with_outliers_removed() {
        let dir = temp_dir("sum");
        let input = dir.join("larva.csv");
        fs::write(&input, LARVA).unwrap();

        let mut cfg = PipelineConfig::new(
            vec![input],
            vec!["State/Province".into()],
            ReductionKind::Sum,
        );
        cfg.field = Some("Number".into());
        cfg.rules = vec![Rule::on("State/Province", vec![Transform::Uppercase])];
        cfg.output = Some(dir.join("out.csv"));

        let mut diag = Diagnostics::new();
        let out = run_pipeline(&cfg, &mut diag).unwrap();

        assert_eq!(out.fields(), &["State/Province", "Number"]);
        assert_eq!(out.len(), 2);
        assert_eq!(out.value(0, "Number").unwrap(), &Value::Number(6.0));
        assert_eq!(out.value(1, "Number").unwrap(), &Value::Number(8.0));
        let written = fs::read_to_string(dir.join("out.csv")).unwrap();
        assert_eq!(written, "State/Province,Number\nTX,6\nOK,8\n");
    }

    #[test]
    fn test_count_sorted_descending() {
        let dir = temp_dir("count");
        let input = dir.join("milkweed.csv");
        fs::write(&input, LARVA).unwrap();

        let mut cfg = PipelineConfig::new(
            vec![input],
            vec!["State/Province".into()],
            ReductionKind::Count,
        );
        cfg.summary_name = Some("MilkweedCount".into());
        cfg.filters = vec![Predicate::not_missing("Town")];
        cfg.sort = true;

        let out = run_pipeline(&cfg, &mut Diagnostics::new()).unwrap();
        assert_eq!(out.fields(), &["State/Province", "MilkweedCount"]);
        // no uppercase rule: TX, tx and OK are distinct
        assert_eq!(out.len(), 3);
        assert_eq!(out.value(0, "MilkweedCount").unwrap(), &Value::Number(2.0));
        assert_eq!(out.value(2, "State/Province").unwrap(), &Value::from("tx"));
    }

    #[test]
    fn test_text_declared_numeric_field_rejected() {
        let mut cfg = PipelineConfig::new(
            vec!["unused.csv".into()],
            vec!["State".into()],
            ReductionKind::Mean,
        );
        cfg.field = Some("Number".into());
        cfg.types.insert("Number".into(), FieldType::Text);
        let err = run_pipeline(&cfg, &mut Diagnostics::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_clean_file() {
        let dir = temp_dir("clean");
        let input = dir.join("larva.csv");
        let output = dir.join("cleaned.csv");
        fs::write(&input, LARVA).unwrap();

        let cleaned = clean_file(
            &input,
            &output,
            "Number",
            OutlierMode::SinglePass,
            &mut Diagnostics::new(),
        )
        .unwrap();
        assert_eq!(cleaned.len(), 4);
        assert!(!fs::read_to_string(&output).unwrap().contains("Dallas"));
    }

    #[test]
    fn test_missing_input_names_source() {
        let dir = temp_dir("missing");
        let err = concat_files(
            &[dir.join("nope.csv")],
            &dir.join("out.csv"),
            true,
            &mut Diagnostics::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingSource { .. }));
        assert!(err.to_string().contains("nope.csv"));
    }
}
