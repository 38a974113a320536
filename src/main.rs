//! CLI entry point for the monarch statistics pipeline.
//!
//! Provides subcommands for aggregating sighting and residue exports,
//! cleaning outliers, concatenating scraped files, combining aggregates by
//! state, and running whole pipelines from a JSON config.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use monarch_stats::analyzers::analyzer::{
    clean_file, combine_files, concat_files, run, run_pipeline,
};
use monarch_stats::analyzers::types::{OutlierMode, ReductionKind};
use monarch_stats::config::{PipelineConfig, RunConfig};
use monarch_stats::error::Diagnostics;
use monarch_stats::table::Value;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "monarch_stats")]
#[command(about = "Group statistics over monarch, milkweed and pesticide CSV exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Group one or more CSV files and reduce a field per group
    Aggregate {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// CSV (or .json) file to write the aggregate to
        #[arg(short, long)]
        output: PathBuf,

        /// Field(s) to group by
        #[arg(short, long = "group-by", required = true)]
        group_by: Vec<String>,

        /// Field read by the reduction and the outlier filter
        #[arg(short, long)]
        field: Option<String>,

        #[arg(short, long, value_enum, default_value_t = ReductionKind::Count)]
        reduction: ReductionKind,

        /// Name of the summary column (defaults to the field name, or Count)
        #[arg(long)]
        summary_name: Option<String>,

        /// Skip IQR outlier removal
        #[arg(long, default_value_t = false)]
        keep_outliers: bool,

        /// Repeat outlier removal until nothing more is dropped
        #[arg(long, default_value_t = false)]
        until_stable: bool,

        /// Uppercase the grouping fields before grouping
        #[arg(long, default_value_t = false)]
        uppercase: bool,

        /// Derive the first grouping field from the first two characters of this field
        #[arg(long, value_name = "SRC")]
        region_from: Option<String>,

        /// Field names for files without a header row
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        /// Drop each file's leading index column
        #[arg(long, default_value_t = false)]
        drop_first_column: bool,

        /// Sort largest-first by the summary column
        #[arg(long, default_value_t = false)]
        sort: bool,
    },
    /// Remove IQR outliers of a numeric field from a CSV file
    Clean {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long)]
        field: String,

        #[arg(long, default_value_t = false)]
        until_stable: bool,
    },
    /// Concatenate scraped CSV files, dropping their index column
    Concat {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = false)]
        keep_first_column: bool,
    },
    /// Outer-join aggregate CSV files on a shared key
    Combine {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, default_value = "State")]
        key: String,

        /// Fill value for keys a file lacks; an empty string leaves them blank
        #[arg(short, long, default_value = "0")]
        default: String,
    },
    /// Run the pipelines described by a JSON config file
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/monarch_stats.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("monarch_stats.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let mut diag = Diagnostics::new();

    match cli.command {
        Commands::Aggregate {
            inputs,
            output,
            group_by,
            field,
            reduction,
            summary_name,
            keep_outliers,
            until_stable,
            uppercase,
            region_from,
            columns,
            drop_first_column,
            sort,
        } => {
            let mut config = PipelineConfig::new(inputs, group_by, reduction);
            config.output = Some(output);
            config.field = field;
            config.summary_name = summary_name;
            config.remove_outliers = !keep_outliers;
            config.outlier_mode = outlier_mode(until_stable);
            config.columns = columns;
            config.drop_first_column = drop_first_column;
            config.sort = sort;
            config.add_grouping_rules(region_from.as_deref(), uppercase)?;

            let table = run_pipeline(&config, &mut diag)
                .with_context(|| format!("aggregating {}", config.label()))?;
            info!(groups = table.len(), "Aggregation complete");
        }
        Commands::Clean {
            input,
            output,
            field,
            until_stable,
        } => {
            clean_file(&input, &output, &field, outlier_mode(until_stable), &mut diag)
                .with_context(|| format!("cleaning {}", input.display()))?;
        }
        Commands::Concat {
            inputs,
            output,
            keep_first_column,
        } => {
            let table = concat_files(&inputs, &output, !keep_first_column, &mut diag)
                .context("concatenating inputs")?;
            info!(rows = table.len(), output = %output.display(), "Concatenation complete");
        }
        Commands::Combine {
            inputs,
            output,
            key,
            default,
        } => {
            let default = Value::parse_literal(&default);
            let table = combine_files(&inputs, &output, &key, &default, &mut diag)
                .with_context(|| format!("combining on '{key}'"))?;
            info!(keys = table.len(), output = %output.display(), "Combine complete");
        }
        Commands::Run { config } => {
            let run_config = RunConfig::load(&config)
                .with_context(|| format!("loading config {}", config.display()))?;
            run(&run_config, &mut diag)
                .with_context(|| format!("running {}", config.display()))?;
        }
    }

    diag.log_summary();
    Ok(())
}

fn outlier_mode(until_stable: bool) -> OutlierMode {
    if until_stable {
        OutlierMode::UntilStable
    } else {
        OutlierMode::SinglePass
    }
}
