//! YAML benchmark configuration.
//!
//! ```yaml
//! dataset:
//!   root: ../ocp_qp_dataset_collection
//!   filters: ["has_masks=false", "has_idxs_rev_not_idxs=false"]
//!   description: Problems without masks and idxs_rev
//! results:
//!   path: results/qpbenchmark_results.csv
//! solvers:
//!   - kind: FULL_CONDENSING_HPIPM
//!     options: { tol_stat: 1e-10 }
//!   - kind: PARTIAL_CONDENSING_OSQP
//! run:
//!   iter_cap: 1000
//! harness:
//!   command: ["python3", "./acados_harness.py"]
//!   timeout_seconds: 60
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::ProblemCatalog;
use crate::collection::DatasetCollection;
use crate::error::{BenchError, Result};
use crate::filter::MetaFilter;
use crate::fsutil::resolve_relative;
use crate::labels::generate_labels;
use crate::process::ProcessBackend;
use crate::runner::{RunOptions, DEFAULT_ITER_CAP};
use crate::solver_set::{OptionValue, SolverConfigSet, SolverConfiguration, SolverKind, SolverOptions};
use crate::table::TableFormat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    pub dataset: DatasetSection,
    #[serde(default)]
    pub results: ResultsSection,
    #[serde(default)]
    pub solvers: Vec<SolverEntry>,
    #[serde(default)]
    pub solver_names: Vec<String>,
    #[serde(default)]
    pub settings: Vec<String>,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub harness: Option<HarnessSection>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetSection {
    pub root: PathBuf,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResultsSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverEntry {
    pub kind: String,
    #[serde(default)]
    pub settings: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RunSection {
    pub repeat_times: u32,
    pub iter_cap: i64,
    pub print_level: i64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            repeat_times: 1,
            iter_cap: DEFAULT_ITER_CAP,
            print_level: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessSection {
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
}

/// What a configuration would run, for `describe`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchSummary {
    pub dataset: PathBuf,
    pub description: String,
    pub filter: String,
    pub problems: usize,
    pub solvers: Vec<SolverSummary>,
    pub total_pairs: usize,
    pub results_path: Option<PathBuf>,
    pub results_format: Option<&'static str>,
    pub repeat_times: u32,
    pub iter_cap: i64,
    pub print_level: i64,
    pub harness_command: Option<Vec<String>>,
    pub harness_timeout_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolverSummary {
    pub solver_id: String,
    pub settings: String,
}

impl BenchConfig {
    /// Parses the file and checks the solver section, so unknown option
    /// names fail here rather than in the middle of a sweep.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_yaml(&text, &base_dir)
    }

    pub fn from_yaml(text: &str, base_dir: &Path) -> Result<Self> {
        let mut config: BenchConfig = serde_yaml::from_str(text)?;
        config.base_dir = base_dir.to_path_buf();
        config.solver_set()?;
        if let Some(timeout) = config.harness.as_ref().and_then(|h| h.timeout_seconds) {
            if !(timeout > 0.0 && timeout.is_finite()) {
                return Err(BenchError::Config(format!(
                    "harness.timeout_seconds must be positive, got {}",
                    timeout
                )));
            }
        }
        Ok(config)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn dataset_root(&self) -> PathBuf {
        resolve_relative(&self.base_dir, &self.dataset.root)
    }

    pub fn results_path(&self) -> Option<PathBuf> {
        self.results
            .path
            .as_deref()
            .map(|p| resolve_relative(&self.base_dir, p))
    }

    pub fn collection(&self) -> DatasetCollection {
        DatasetCollection::new(self.dataset_root())
    }

    pub fn filter(&self) -> Result<MetaFilter> {
        MetaFilter::all_of(&self.dataset.filters)
    }

    /// Discovers the dataset and applies the configured filters.
    pub fn catalog(&self) -> Result<ProblemCatalog> {
        let mut catalog = ProblemCatalog::discover(&self.dataset_root())?;
        if !self.dataset.filters.is_empty() {
            catalog = catalog.filter_by_meta(&self.filter()?)?;
        }
        Ok(catalog.with_description(self.dataset.description.clone()))
    }

    pub fn solver_set(&self) -> Result<SolverConfigSet> {
        match (self.solvers.is_empty(), self.solver_names.is_empty()) {
            (false, false) => Err(BenchError::Config(
                "use either solvers or solver_names, not both".to_string(),
            )),
            (false, true) => {
                if !self.settings.is_empty() {
                    return Err(BenchError::Config(
                        "settings only applies to solver_names; label explicit solvers individually"
                            .to_string(),
                    ));
                }
                let configs = self
                    .solvers
                    .iter()
                    .map(SolverEntry::build)
                    .collect::<Result<Vec<_>>>()?;
                Ok(SolverConfigSet::new(configs))
            }
            (true, _) => Ok(SolverConfigSet::from_kind_names(
                &self.solver_names,
                &self.settings,
            )),
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            repeat_times: self.run.repeat_times,
            iter_cap: self.run.iter_cap,
            print_level: self.run.print_level,
        }
    }

    pub fn backend(&self) -> Result<ProcessBackend> {
        let harness = self
            .harness
            .as_ref()
            .ok_or_else(|| BenchError::Config("harness.command is not configured".to_string()))?;
        let timeout = harness.timeout_seconds.map(Duration::from_secs_f64);
        ProcessBackend::new(&harness.command, &self.base_dir, timeout)
    }

    pub fn describe(&self) -> Result<BenchSummary> {
        let catalog = self.catalog()?;
        let solvers = self.solver_set()?;
        let results_path = self.results_path();
        let results_format = match results_path.as_deref() {
            Some(p) => Some(TableFormat::from_path(p)?.as_str()),
            None => None,
        };
        Ok(BenchSummary {
            dataset: self.dataset_root(),
            description: catalog.description().to_string(),
            filter: self.filter()?.to_string(),
            problems: catalog.count_problems(),
            solvers: solvers
                .iter()
                .map(|c| SolverSummary {
                    solver_id: c.solver_id(),
                    settings: c.settings.clone(),
                })
                .collect(),
            total_pairs: catalog.count_problems() * solvers.len(),
            results_path,
            results_format,
            repeat_times: self.run.repeat_times,
            iter_cap: self.run.iter_cap,
            print_level: self.run.print_level,
            harness_command: self.harness.as_ref().map(|h| h.command.clone()),
            harness_timeout_seconds: self.harness.as_ref().and_then(|h| h.timeout_seconds),
        })
    }

    /// Generated labels, overridden by any explicit `labels` entries.
    pub fn labels(&self, solvers: &SolverConfigSet) -> BTreeMap<String, String> {
        let mut labels = generate_labels(solvers);
        labels.extend(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        labels
    }
}

impl SolverEntry {
    fn build(&self) -> Result<SolverConfiguration> {
        let kind: SolverKind = self.kind.parse()?;
        let mut options = SolverOptions::new(kind);
        for (name, value) in &self.options {
            options.set(name, option_value(name, value)?)?;
        }
        let config = SolverConfiguration::new(options);
        Ok(match &self.settings {
            Some(label) => config.with_settings(label.clone()),
            None => config,
        })
    }
}

fn option_value(name: &str, value: &serde_yaml::Value) -> Result<OptionValue> {
    use serde_yaml::Value as Y;
    match value {
        Y::Null => Ok(OptionValue::Unset),
        Y::Bool(b) => Ok(OptionValue::Int(i64::from(*b))),
        Y::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(OptionValue::Int(i)),
            (None, Some(f)) => Ok(OptionValue::Float(f)),
            _ => Err(BenchError::invalid_value(name, format!("unsupported number {}", n))),
        },
        Y::String(s) => Ok(OptionValue::Text(s.clone())),
        other => Err(BenchError::invalid_value(
            name,
            format!("expected a scalar, got {:?}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::write_problem;
    use crate::fsutil::scratch_dir;

    const EXPLICIT: &str = r#"
dataset:
  root: data
  filters: ["has_masks=false"]
  description: Problems without masks
results:
  path: results/out.parquet
solvers:
  - kind: FULL_CONDENSING_HPIPM
    options:
      tol_stat: 1e-10
  - kind: PARTIAL_CONDENSING_OSQP
    settings: warm
    options:
      warm_start: true
      cond_N: 5
labels:
  PARTIAL_CONDENSING_OSQP_cond_N=5_warm_start=1: osqp warm
"#;

    #[test]
    fn explicit_solvers_and_relative_paths() {
        let root = scratch_dir("config_explicit");
        write_problem(&root.join("data").join("set"), "plain", 5, (false, false, false));
        write_problem(&root.join("data").join("set"), "masked", 5, (false, true, false));
        let path = root.join("bench.yaml");
        fs::write(&path, EXPLICIT).expect("yaml");

        let config = BenchConfig::load(&path).expect("load");
        assert_eq!(config.results_path(), Some(root.join("results").join("out.parquet")));
        assert_eq!(config.run_options(), RunOptions::default());

        let catalog = config.catalog().expect("catalog");
        assert_eq!(catalog.problem_names().expect("names"), vec!["plain".to_string()]);
        assert_eq!(catalog.title(), "Problems without masks");

        let set = config.solver_set().expect("solvers");
        assert_eq!(
            set.solver_ids(),
            vec![
                "FULL_CONDENSING_HPIPM_tol_stat=1e-10".to_string(),
                "PARTIAL_CONDENSING_OSQP_cond_N=5_warm_start=1".to_string(),
            ]
        );
        let settings: Vec<&str> = set.iter().map(|c| c.settings.as_str()).collect();
        assert_eq!(settings, vec!["default", "warm"]);

        let labels = config.labels(&set);
        assert_eq!(labels["PARTIAL_CONDENSING_OSQP_cond_N=5_warm_start=1"], "osqp warm");
        assert!(labels.contains_key("FULL_CONDENSING_HPIPM_tol_stat=1e-10"));
        assert!(matches!(config.backend(), Err(BenchError::Config(_))));

        let summary = config.describe().expect("describe");
        assert_eq!(summary.problems, 1);
        assert_eq!(summary.total_pairs, 2);
        assert_eq!(summary.filter, "(has_masks=false)");
        assert_eq!(summary.results_format, Some("parquet"));
        assert_eq!(summary.harness_command, None);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn kind_names_cross_settings_and_run_section() {
        let yaml = r#"
dataset: { root: /data/collection }
solver_names: [FULL_CONDENSING_HPIPM, NOT_A_SOLVER, FULL_CONDENSING_DAQP]
settings: [default, tight]
run: { iter_cap: 200, print_level: 0 }
"#;
        let config = BenchConfig::from_yaml(yaml, Path::new("/etc/qpbench")).expect("parse");
        assert_eq!(config.dataset_root(), PathBuf::from("/data/collection"));
        assert_eq!(config.results_path(), None);
        assert_eq!(config.run_options().iter_cap, 200);
        assert_eq!(config.run_options().repeat_times, 1);
        assert_eq!(config.solver_set().expect("set").len(), 4);
    }

    #[test]
    fn unknown_option_fails_at_load() {
        let yaml = r#"
dataset: { root: data }
solvers:
  - kind: FULL_CONDENSING_HPIPM
    options: { tol_magic: 1.0 }
"#;
        let err = BenchConfig::from_yaml(yaml, Path::new(".")).expect_err("unknown option");
        assert!(matches!(err, BenchError::UnknownOption(name) if name == "tol_magic"));
    }

    #[test]
    fn inconsistent_sections_are_rejected() {
        let both = r#"
dataset: { root: data }
solvers: [{ kind: FULL_CONDENSING_HPIPM }]
solver_names: [FULL_CONDENSING_DAQP]
"#;
        assert!(matches!(
            BenchConfig::from_yaml(both, Path::new(".")),
            Err(BenchError::Config(_))
        ));
        let bad_kind = "dataset: { root: data }\nsolvers: [{ kind: MYSTERY }]\n";
        assert!(matches!(
            BenchConfig::from_yaml(bad_kind, Path::new(".")),
            Err(BenchError::UnknownSolverKind(_))
        ));
        let bad_timeout = "dataset: { root: data }\nharness: { command: [x], timeout_seconds: 0 }\n";
        assert!(matches!(
            BenchConfig::from_yaml(bad_timeout, Path::new(".")),
            Err(BenchError::Config(_))
        ));
        let typo = "dataset: { root: data, filter: [] }\n";
        assert!(matches!(
            BenchConfig::from_yaml(typo, Path::new(".")),
            Err(BenchError::Yaml(_))
        ));
    }
}
