//! Seam between the harness and the numerical solvers it benchmarks.
//!
//! Problem parsing and the solve itself live outside this crate; anything
//! that can load a problem file and build a solver from [`SolverOptions`]
//! can be plugged in. Implementations report failures with `anyhow`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::solver_set::SolverOptions;

/// Post-solve statistics. Times are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveStatistics {
    #[serde(rename = "iter")]
    pub iterations: i64,
    pub time_tot: f64,
    /// Condensing (reformulation) phase.
    pub time_qp_xcond: f64,
    /// Inner QP solver call.
    pub time_qp_solver_call: f64,
    pub cost: Option<f64>,
    /// Wall time of the solve call as measured next to the solver. Backends
    /// that pay setup cost inside `solve` report it so that cost stays out.
    pub time_external: Option<f64>,
}

impl SolveStatistics {
    /// Condensing plus inner solve, without setup or allocation time.
    pub fn fair_runtime(&self) -> f64 {
        self.time_qp_xcond + self.time_qp_solver_call
    }
}

/// Structural facts about a problem, as stored in its metadata file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemTraits {
    #[serde(rename = "N")]
    pub horizon: u32,
    #[serde(default)]
    pub has_slacks: bool,
    #[serde(default)]
    pub has_masks: bool,
    #[serde(default)]
    pub has_idxs_rev_not_idxs: bool,
}

pub trait QpSolver {
    /// Runs the solver and returns its status code; 0 means solved.
    fn solve(&mut self) -> anyhow::Result<i64>;

    fn statistics(&self) -> SolveStatistics;

    /// Serialized primal/dual iterate of the last solve.
    fn iterate(&self) -> anyhow::Result<Value>;
}

pub trait SolverBackend {
    type Problem;
    type Solver: QpSolver;

    fn load_problem(&self, data: &Path) -> anyhow::Result<Self::Problem>;

    fn create_solver(
        &self,
        problem: &Self::Problem,
        options: &SolverOptions,
    ) -> anyhow::Result<Self::Solver>;

    fn describe_problem(&self, problem: &Self::Problem) -> anyhow::Result<ProblemTraits>;
}
