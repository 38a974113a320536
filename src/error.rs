//! Error and warning types shared by every pipeline stage.
//!
//! Fatal conditions are [`PipelineError`] values and abort a run. Recoverable
//! conditions are [`Warning`]s pushed into a [`Diagnostics`] collector, which
//! logs them as they arrive and keeps them for the caller to inspect.

use thiserror::Error;
use tracing::{debug, warn};

/// Fatal pipeline errors. Each variant names the offending source or field.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source '{source_name}' could not be read: {reason}")]
    MissingSource { source_name: String, reason: String },

    #[error("source '{source_name}' is empty: {reason}")]
    EmptySource { source_name: String, reason: String },

    #[error("source '{source_name}' could not be parsed as CSV: {reason}")]
    ParseFailure { source_name: String, reason: String },

    #[error("field '{field}' not found in {context}")]
    UnknownField { field: String, context: String },

    #[error("key '{key}' appears more than once in combine input #{input}")]
    DuplicateKey { key: String, input: usize },

    #[error("record has {found} values but the table has {expected} fields")]
    RecordWidth { expected: usize, found: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to write '{path}': {reason}")]
    Write { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Non-fatal conditions. Processing continues with best-effort semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A combined source's fields differ from the reference (first) source.
    SchemaMismatch {
        source_name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
    /// A single value could not be coerced and was replaced by missing.
    FieldCoercionFailure {
        field: String,
        row: usize,
        value: String,
        target: &'static str,
    },
}

/// Warning channel threaded through the stages that can emit warnings.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning and logs it.
    ///
    /// Coercion failures can number in the thousands on real exports, so they
    /// go to `debug`; [`Diagnostics::log_summary`] reports their totals.
    pub fn push(&mut self, warning: Warning) {
        match &warning {
            Warning::SchemaMismatch {
                source_name,
                expected,
                found,
            } => {
                warn!(
                    source = %source_name,
                    expected = ?expected,
                    found = ?found,
                    "Schema mismatch, aligning to reference columns"
                );
            }
            Warning::FieldCoercionFailure {
                field,
                row,
                value,
                target,
            } => {
                debug!(field = %field, row, value = %value, target, "Value coerced to missing");
            }
        }
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn coercion_failures(&self, field: &str) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, Warning::FieldCoercionFailure { field: f, .. } if f == field))
            .count()
    }

    pub fn schema_mismatches(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, Warning::SchemaMismatch { .. }))
            .count()
    }

    /// Logs one line per field that had coercion failures.
    pub fn log_summary(&self) {
        let mut per_field: Vec<(&str, usize)> = Vec::new();
        for w in &self.warnings {
            if let Warning::FieldCoercionFailure { field, .. } = w {
                match per_field.iter_mut().find(|(f, _)| *f == field.as_str()) {
                    Some((_, n)) => *n += 1,
                    None => per_field.push((field.as_str(), 1)),
                }
            }
        }
        for (field, count) in per_field {
            warn!(field, count, "Values could not be coerced and were set to missing");
        }
    }
}
