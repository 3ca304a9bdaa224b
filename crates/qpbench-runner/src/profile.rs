//! Performance-profile data: per solver, how many problems were solved
//! within a given metric value. Rendering is left to the consumer.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::error::{BenchError, Result};
use crate::fsutil::atomic_write_json_pretty;
use crate::table::RunRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cost,
    RuntimeExternal,
    RuntimeInternal,
    RuntimeFair,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Cost,
        Metric::RuntimeExternal,
        Metric::RuntimeInternal,
        Metric::RuntimeFair,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cost => "cost",
            Metric::RuntimeExternal => "runtime_external",
            Metric::RuntimeInternal => "runtime_internal",
            Metric::RuntimeFair => "runtime_fair",
        }
    }

    pub fn value(&self, row: &RunRecord) -> f64 {
        match self {
            Metric::Cost => row.cost,
            Metric::RuntimeExternal => row.runtime_external,
            Metric::RuntimeInternal => row.runtime_internal,
            Metric::RuntimeFair => row.runtime_fair,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| BenchError::Unsupported(format!("metric '{}'", s)))
    }
}

/// Step curve of one solver. `values` is sorted ascending and ends with the
/// common maximum so every curve spans the same range; `solved[i]` is the
/// number of problems solved within `values[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileCurve {
    pub solver_id: String,
    pub label: String,
    pub values: Vec<f64>,
    pub solved: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub metric: Metric,
    pub title: String,
    pub problem_count: usize,
    pub max_value: f64,
    pub curves: Vec<ProfileCurve>,
}

impl Profile {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        atomic_write_json_pretty(path, &serde_json::to_value(self)?)
    }
}

/// Builds one curve per solver from rows with status 0. Without explicit
/// `solver_ids` every solver with a solved row is used, in name order.
pub fn performance_profile(
    rows: &[RunRecord],
    metric: Metric,
    solver_ids: Option<&[String]>,
    labels: &BTreeMap<String, String>,
    problem_count: usize,
    title: &str,
) -> Profile {
    let solved: Vec<&RunRecord> = rows.iter().filter(|r| r.status == 0).collect();
    let ids: Vec<String> = match solver_ids {
        Some(ids) => ids.to_vec(),
        None => solved
            .iter()
            .map(|r| r.solver.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };

    let mut sorted_values = Vec::new();
    let mut max_value = 0.0_f64;
    for solver_id in ids {
        let mut values: Vec<f64> = solved
            .iter()
            .filter(|r| r.solver == solver_id)
            .map(|r| metric.value(r))
            .filter(|v| !v.is_nan())
            .collect();
        if values.is_empty() {
            warn!(solver = %solver_id, metric = %metric, "no values to plot for solver");
            continue;
        }
        values.sort_by(f64::total_cmp);
        max_value = max_value.max(values[values.len() - 1]);
        sorted_values.push((solver_id, values));
    }

    let curves = sorted_values
        .into_iter()
        .map(|(solver_id, mut values)| {
            let count = values.len();
            let mut solved: Vec<usize> = (1..=count).collect();
            values.push(max_value);
            solved.push(count);
            ProfileCurve {
                label: labels.get(&solver_id).cloned().unwrap_or_else(|| solver_id.clone()),
                solver_id,
                values,
                solved,
            }
        })
        .collect();

    Profile {
        metric,
        title: title.to_string(),
        problem_count,
        max_value,
        curves,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(problem: &str, solver: &str, status: i64, fair: f64) -> RunRecord {
        RunRecord {
            problem: problem.to_string(),
            solver: solver.to_string(),
            settings: "default".to_string(),
            cost: f64::NAN,
            iterations: 3,
            runtime_external: fair * 2.0,
            runtime_internal: fair * 1.5,
            runtime_fair: fair,
            status,
        }
    }

    fn rows() -> Vec<RunRecord> {
        vec![
            row("p1", "A", 0, 0.3),
            row("p2", "A", 0, 0.1),
            row("p3", "A", 1, 0.05),
            row("p1", "B", 0, 0.9),
            row("p2", "B", -1, -1.0),
        ]
    }

    #[test]
    fn curves_are_sorted_and_padded_to_common_max() {
        let labels = BTreeMap::from([("A".to_string(), "solver a".to_string())]);
        let profile = performance_profile(&rows(), Metric::RuntimeFair, None, &labels, 3, "all");
        assert_eq!(profile.max_value, 0.9);
        assert_eq!(profile.problem_count, 3);
        assert_eq!(profile.curves.len(), 2);

        let a = &profile.curves[0];
        assert_eq!(a.label, "solver a");
        assert_eq!(a.values, vec![0.1, 0.3, 0.9]);
        assert_eq!(a.solved, vec![1, 2, 2]);

        let b = &profile.curves[1];
        assert_eq!(b.label, "B");
        assert_eq!(b.values, vec![0.9, 0.9]);
        assert_eq!(b.solved, vec![1, 1]);
    }

    #[test]
    fn solvers_without_solved_rows_are_omitted() {
        let ids = vec!["B".to_string(), "C".to_string()];
        let profile = performance_profile(
            &rows(),
            Metric::RuntimeExternal,
            Some(ids.as_slice()),
            &BTreeMap::new(),
            3,
            "",
        );
        assert_eq!(profile.curves.len(), 1);
        assert_eq!(profile.curves[0].solver_id, "B");
        assert_eq!(profile.curves[0].values, vec![1.8, 1.8]);
        assert!(performance_profile(&rows(), Metric::Cost, None, &BTreeMap::new(), 3, "")
            .curves
            .is_empty());
    }

    #[test]
    fn metric_names_parse() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>().expect("metric"), metric);
        }
        assert!("iterations".parse::<Metric>().is_err());
    }
}
