//! Data types used by the aggregation pipeline.

use clap::ValueEnum;
use serde::Deserialize;

/// A per-group reduction over the records of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    /// Number of records in the group, missing values included.
    Count,
    Sum(String),
    Mean(String),
    Median(String),
    Max(String),
    Min(String),
}

impl Reduction {
    /// The numeric field this reduction reads, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Reduction::Count => None,
            Reduction::Sum(f)
            | Reduction::Mean(f)
            | Reduction::Median(f)
            | Reduction::Max(f)
            | Reduction::Min(f) => Some(f),
        }
    }
}

/// A reduction plus the name of the column it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub reduction: Reduction,
    pub name: Option<String>,
}

impl Summary {
    pub fn new(reduction: Reduction) -> Self {
        Self {
            reduction,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `Count` for counts; otherwise the source field's own name, the way a
    /// grouped column keeps its name after reduction.
    pub fn output_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match self.reduction.field() {
            Some(field) => field.to_string(),
            None => "Count".to_string(),
        }
    }
}

/// Reduction selectable from the command line or a pipeline config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReductionKind {
    Count,
    Sum,
    Mean,
    Median,
    Max,
    Min,
    /// The full record holding each group's maximum.
    MaxRecord,
    /// Each group's most frequent value of the field.
    MostCommon,
}

impl ReductionKind {
    pub fn needs_field(self) -> bool {
        !matches!(self, ReductionKind::Count)
    }

    /// The plain summary for this kind, or `None` for the record-selecting kinds.
    pub fn summary(self, field: Option<&str>) -> Option<Reduction> {
        let f = || field.unwrap_or_default().to_string();
        match self {
            ReductionKind::Count => Some(Reduction::Count),
            ReductionKind::Sum => Some(Reduction::Sum(f())),
            ReductionKind::Mean => Some(Reduction::Mean(f())),
            ReductionKind::Median => Some(Reduction::Median(f())),
            ReductionKind::Max => Some(Reduction::Max(f())),
            ReductionKind::Min => Some(Reduction::Min(f())),
            ReductionKind::MaxRecord | ReductionKind::MostCommon => None,
        }
    }
}

/// How many outlier passes to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMode {
    #[default]
    SinglePass,
    /// Repeat until a pass removes nothing.
    UntilStable,
}

/// IQR-derived bounds for one filtering pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceRange {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl AcceptanceRange {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Inclusive on both ends.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}
