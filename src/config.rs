//! Pipeline configuration.
//!
//! A [`PipelineConfig`] describes one load → normalize → filter → aggregate
//! run. A [`RunConfig`] groups several pipelines whose aggregates are then
//! combined on a shared key. Both are plain JSON on disk:
//!
//! ```json
//! {
//!   "pipelines": [
//!     {
//!       "name": "milkweed",
//!       "inputs": ["scrape/full_milkweed_2024.csv"],
//!       "rules": [{"field": "State/Province", "into": "State", "steps": [{"op": "uppercase"}]}],
//!       "group_by": ["State"],
//!       "reduction": "count",
//!       "summary_name": "MilkweedCount"
//!     }
//!   ],
//!   "combine": {"key": "State", "default": 0, "output": "combined.csv"}
//! }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::analyzers::types::{OutlierMode, ReductionKind};
use crate::error::{PipelineError, Result};
use crate::filter::Predicate;
use crate::loader::{HeaderMode, LoadOptions};
use crate::normalize::{Rule, Transform};
use crate::table::{FieldType, Value};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Label used in logs and combine diagnostics.
    #[serde(default)]
    pub name: Option<String>,
    pub inputs: Vec<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Field names for sources without a header row.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub drop_first_column: bool,
    #[serde(default)]
    pub types: BTreeMap<String, FieldType>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub filters: Vec<Predicate>,
    /// Field read by the reduction and the outlier filter.
    #[serde(default, alias = "numeric_field")]
    pub field: Option<String>,
    #[serde(default = "default_true")]
    pub remove_outliers: bool,
    #[serde(default)]
    pub outlier_mode: OutlierMode,
    pub group_by: Vec<String>,
    pub reduction: ReductionKind,
    #[serde(default)]
    pub summary_name: Option<String>,
    /// Rules applied to the aggregated table, e.g. flagging whether each
    /// group's most common pesticide is a neonicotinoid.
    #[serde(default)]
    pub annotate: Vec<Rule>,
    /// Sort output largest-first by the summary column.
    #[serde(default)]
    pub sort: bool,
}

impl PipelineConfig {
    /// A config with the required parts set and everything else defaulted.
    pub fn new(inputs: Vec<PathBuf>, group_by: Vec<String>, reduction: ReductionKind) -> Self {
        Self {
            name: None,
            inputs,
            output: None,
            columns: None,
            drop_first_column: false,
            types: BTreeMap::new(),
            rules: Vec::new(),
            filters: Vec::new(),
            field: None,
            remove_outliers: true,
            outlier_mode: OutlierMode::default(),
            group_by,
            reduction,
            summary_name: None,
            annotate: Vec::new(),
            sort: false,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let cfg: Self = read_json(path.as_ref())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .inputs
                .first()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let label = self.label();
        if self.inputs.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "pipeline '{label}' has no inputs"
            )));
        }
        if self.group_by.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "pipeline '{label}' has no grouping field"
            )));
        }
        if self.reduction.needs_field() && self.field.is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "pipeline '{label}': reduction {:?} needs a field",
                self.reduction
            )));
        }
        if let Some(columns) = &self.columns {
            for (i, c) in columns.iter().enumerate() {
                if columns[..i].contains(c) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "pipeline '{label}': column '{c}' listed twice"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            header: match &self.columns {
                Some(columns) => HeaderMode::Explicit(columns.clone()),
                None => HeaderMode::Infer,
            },
            types: self.types.clone(),
            min_fields: if self.drop_first_column { 2 } else { 1 },
        }
    }

    /// Adds rules that prepare the grouping fields.
    ///
    /// `region_from` derives the first grouping field from the first two
    /// characters of that field, the way a residue sample id starts with its
    /// state code. `uppercase` folds case on the grouping fields.
    pub fn add_grouping_rules(&mut self, region_from: Option<&str>, uppercase: bool) -> Result<()> {
        let mut in_place = self.group_by.as_slice();
        let mut rules = Vec::new();

        if let Some(source) = region_from {
            let Some((target, rest)) = self.group_by.split_first() else {
                return Err(PipelineError::InvalidConfig(
                    "deriving a region needs a grouping field to write".into(),
                ));
            };
            let mut steps = vec![Transform::Trim, Transform::Prefix { len: 2 }];
            if uppercase {
                steps.push(Transform::Uppercase);
            }
            rules.push(Rule::derive(source, target.clone(), steps));
            in_place = rest;
        }

        if uppercase {
            rules.extend(
                in_place
                    .iter()
                    .map(|f| Rule::on(f.clone(), vec![Transform::Trim, Transform::Uppercase])),
            );
        }
        self.rules.extend(rules);
        Ok(())
    }

    /// Declared type of `field`, if any.
    pub fn declared_type(&self, field: &str) -> Option<FieldType> {
        self.types.get(field).copied()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombineConfig {
    pub key: String,
    /// Fill value for keys a source lacks: a number, a string, or null.
    #[serde(default = "default_fill")]
    pub default: serde_json::Value,
    pub output: PathBuf,
}

fn default_fill() -> serde_json::Value {
    serde_json::Value::from(0)
}

impl CombineConfig {
    pub fn default_value(&self) -> Result<Value> {
        match &self.default {
            serde_json::Value::Null => Ok(Value::Missing),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).ok_or_else(|| {
                PipelineError::InvalidConfig(format!("combine default {n} is not representable"))
            }),
            serde_json::Value::String(s) => Ok(Value::parse_literal(s)),
            other => Err(PipelineError::InvalidConfig(format!(
                "combine default must be a number, string or null, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub pipelines: Vec<PipelineConfig>,
    #[serde(default)]
    pub combine: Option<CombineConfig>,
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let cfg: Self = read_json(path.as_ref())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipelines.is_empty() {
            return Err(PipelineError::InvalidConfig("no pipelines configured".into()));
        }
        for p in &self.pipelines {
            p.validate()?;
        }
        match &self.combine {
            Some(combine) => {
                for p in &self.pipelines {
                    if !p.group_by.contains(&combine.key) {
                        return Err(PipelineError::InvalidConfig(format!(
                            "pipeline '{}' does not group by combine key '{}'",
                            p.label(),
                            combine.key
                        )));
                    }
                }
                combine.default_value()?;
            }
            None => {
                if let Some(p) = self.pipelines.iter().find(|p| p.output.is_none()) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "pipeline '{}' has no output and there is no combine step",
                        p.label()
                    )));
                }
            }
        }
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::InvalidConfig(format!("cannot read '{}': {e}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        PipelineError::InvalidConfig(format!("cannot parse '{}': {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: &str = r#"{
        "pipelines": [
            {
                "name": "neonic",
                "inputs": ["USDA_PDP_AnalyticalResults.csv"],
                "columns": ["SampleID", "Type", "PesticideCode", "PesticideName", "Category", "Concentration"],
                "types": {"Concentration": "number"},
                "rules": [{"field": "SampleID", "into": "State", "steps": [{"op": "prefix", "len": 2}]}],
                "filters": [{"op": "one_of", "field": "PesticideName", "values": ["Imidacloprid"]}],
                "numeric_field": "Concentration",
                "remove_outliers": false,
                "group_by": ["State"],
                "reduction": "mean"
            },
            {
                "name": "larva",
                "inputs": ["full_larva_2024.csv"],
                "group_by": ["State"],
                "reduction": "count",
                "summary_name": "LarvaCount"
            }
        ],
        "combine": {"key": "State", "default": 0, "output": "combined.csv"}
    }"#;

    #[test]
    fn test_run_config_parses() {
        let cfg: RunConfig = serde_json::from_str(RUN).unwrap();
        cfg.validate().unwrap();

        let neonic = &cfg.pipelines[0];
        assert_eq!(neonic.field.as_deref(), Some("Concentration"));
        assert!(!neonic.remove_outliers);
        assert_eq!(neonic.declared_type("Concentration"), Some(FieldType::Number));
        assert_eq!(neonic.reduction, ReductionKind::Mean);
        assert!(matches!(
            neonic.load_options().header,
            HeaderMode::Explicit(ref c) if c.len() == 6
        ));

        let larva = &cfg.pipelines[1];
        assert!(larva.remove_outliers);
        assert_eq!(larva.outlier_mode, OutlierMode::SinglePass);
        assert_eq!(larva.label(), "larva");

        let combine = cfg.combine.as_ref().unwrap();
        assert_eq!(combine.default_value().unwrap(), Value::Number(0.0));
    }

    #[test]
    fn test_reduction_needs_field() {
        let mut cfg = PipelineConfig::new(
            vec!["a.csv".into()],
            vec!["State".into()],
            ReductionKind::Median,
        );
        cfg.output = Some("out.csv".into());
        assert!(cfg.validate().is_err());
        cfg.field = Some("Number".into());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_combine_key_must_be_grouped() {
        let mut cfg: RunConfig = serde_json::from_str(RUN).unwrap();
        cfg.pipelines[1].group_by = vec!["Town".into()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_output_required_without_combine() {
        let mut cfg: RunConfig = serde_json::from_str(RUN).unwrap();
        cfg.combine = None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = serde_json::from_str::<PipelineConfig>(
            r#"{"inputs": ["a.csv"], "group_by": ["State"], "reduction": "count", "colour": "red"}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_combine_defaults() {
        let c: CombineConfig =
            serde_json::from_str(r#"{"key": "State", "output": "x.csv"}"#).unwrap();
        assert_eq!(c.default_value().unwrap(), Value::Number(0.0));
        let c: CombineConfig =
            serde_json::from_str(r#"{"key": "State", "default": null, "output": "x.csv"}"#)
                .unwrap();
        assert_eq!(c.default_value().unwrap(), Value::Missing);
    }

    #[test]
    fn test_region_from_derives_first_grouping_field() {
        let mut cfg = PipelineConfig::new(
            vec!["residues.csv".into()],
            vec!["State".into(), "Commodity".into()],
            ReductionKind::Count,
        );
        cfg.add_grouping_rules(Some("SampleID"), true).unwrap();

        assert_eq!(cfg.rules.len(), 2);
        assert_eq!(
            cfg.rules[0],
            Rule::derive(
                "SampleID",
                "State",
                vec![
                    Transform::Trim,
                    Transform::Prefix { len: 2 },
                    Transform::Uppercase
                ],
            )
        );
        assert_eq!(
            cfg.rules[1],
            Rule::on("Commodity", vec![Transform::Trim, Transform::Uppercase])
        );
    }

    #[test]
    fn test_uppercase_only_folds_grouping_fields() {
        let mut cfg = PipelineConfig::new(
            vec!["larva.csv".into()],
            vec!["State/Province".into()],
            ReductionKind::Count,
        );
        cfg.add_grouping_rules(None, true).unwrap();
        assert_eq!(
            cfg.rules,
            vec![Rule::on("State/Province", vec![Transform::Trim, Transform::Uppercase])]
        );

        let mut plain = PipelineConfig::new(
            vec!["larva.csv".into()],
            vec!["State/Province".into()],
            ReductionKind::Count,
        );
        plain.add_grouping_rules(None, false).unwrap();
        assert!(plain.rules.is_empty());
    }

    #[test]
    fn test_region_from_needs_grouping_field() {
        let mut cfg =
            PipelineConfig::new(vec!["residues.csv".into()], Vec::new(), ReductionKind::Count);
        let err = cfg.add_grouping_rules(Some("SampleID"), false).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RunConfig::load("/no/such/config.json").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
