//! Benchmark loop: every solver configuration against every catalog problem.

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{QpSolver, SolverBackend};
use crate::catalog::{ProblemCatalog, ProblemPaths};
use crate::error::{BenchError, Result};
use crate::ledger::{Outcome, ResultsLedger};
use crate::solver_set::{SolverConfigSet, SolverConfiguration};

pub const DEFAULT_ITER_CAP: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Timed repetitions per pair. Only 1 is supported.
    pub repeat_times: u32,
    /// Upper bound applied to every configuration's `iter_max`.
    pub iter_cap: i64,
    pub print_level: i64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            repeat_times: 1,
            iter_cap: DEFAULT_ITER_CAP,
            print_level: 1,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.repeat_times != 1 {
            return Err(BenchError::Unsupported(format!(
                "repeat_times={} (only 1 is implemented)",
                self.repeat_times
            )));
        }
        if self.iter_cap < 1 {
            return Err(BenchError::invalid_value("iter_cap", "must be at least 1"));
        }
        Ok(())
    }
}

/// Progress of a sweep, reported after every pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub active_solver: String,
    pub settings: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub configurations: usize,
    pub pairs: usize,
    pub solved: usize,
    pub failed_status: usize,
    pub sentinel: usize,
}

pub struct BenchmarkRunner<'a, B: SolverBackend> {
    backend: &'a B,
    options: RunOptions,
}

impl<'a, B: SolverBackend> BenchmarkRunner<'a, B> {
    pub fn new(backend: &'a B, options: RunOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn run(
        &self,
        catalog: &ProblemCatalog,
        solvers: &SolverConfigSet,
        ledger: &mut ResultsLedger,
    ) -> Result<RunSummary> {
        self.run_with_progress(catalog, solvers, ledger, |_| {})
    }

    /// Solver-major sweep. The ledger is written once after each
    /// configuration, so an interruption loses at most the configuration in
    /// progress. Problem load errors abort the sweep; solver errors are
    /// recorded as sentinel outcomes.
    pub fn run_with_progress<F>(
        &self,
        catalog: &ProblemCatalog,
        solvers: &SolverConfigSet,
        ledger: &mut ResultsLedger,
        mut on_progress: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(&Progress),
    {
        self.options.validate()?;
        let problems = catalog.iter().count();
        let total = problems * solvers.len();
        let mut summary = RunSummary {
            configurations: solvers.len(),
            ..RunSummary::default()
        };
        info!(
            configurations = solvers.len(),
            problems,
            "starting benchmark sweep"
        );

        for config in solvers {
            let solver_id = config.solver_id();
            for paths in catalog.iter() {
                let outcome = self.run_pair(&paths, config)?;
                ledger.update(&paths.meta, &solver_id, &config.settings, &outcome)?;

                summary.pairs += 1;
                if outcome.is_sentinel() {
                    summary.sentinel += 1;
                } else if outcome.status == 0 {
                    summary.solved += 1;
                } else {
                    summary.failed_status += 1;
                }
                on_progress(&Progress {
                    completed: summary.pairs,
                    total,
                    active_solver: solver_id.clone(),
                    settings: config.settings.clone(),
                });
            }
            ledger.write(None)?;
            info!(
                solver = %solver_id,
                settings = %config.settings,
                completed = summary.pairs,
                total,
                "checkpointed results"
            );
        }
        Ok(summary)
    }

    fn run_pair(&self, paths: &ProblemPaths, config: &SolverConfiguration) -> Result<Outcome> {
        if self.options.print_level > 1 {
            info!(
                problem = %paths.data.display(),
                solver = %config.solver_id(),
                settings = %config.settings,
                "solving"
            );
        }
        let problem = self.backend.load_problem(&paths.data)?;
        Ok(self.solve_problem(&problem, config))
    }

    /// Solves one problem with a private copy of `config`'s options. Only the
    /// solve call is timed; a time reported by the backend takes precedence.
    pub fn solve_problem(&self, problem: &B::Problem, config: &SolverConfiguration) -> Outcome {
        let mut options = config.options.clone();
        options.iter_max = options.iter_max.min(self.options.iter_cap);
        options.print_level = (self.options.print_level - 1).max(0);

        let mut solver = match self.backend.create_solver(problem, &options) {
            Ok(solver) => solver,
            Err(err) => {
                warn!(solver = %config.solver_id(), error = %err, "solver construction failed");
                return Outcome::sentinel();
            }
        };

        let start = Instant::now();
        let solved = solver.solve();
        let measured = start.elapsed().as_secs_f64();
        let status = match solved {
            Ok(status) => status,
            Err(err) => {
                warn!(solver = %config.solver_id(), error = %err, "solve call failed");
                return Outcome::sentinel();
            }
        };
        if status != 0 {
            debug!(solver = %config.solver_id(), status, "solver returned non-zero status");
        }

        let stats = solver.statistics();
        Outcome {
            status,
            iterations: stats.iterations,
            runtime_external: stats.time_external.unwrap_or(measured),
            runtime_internal: stats.time_tot,
            runtime_fair: stats.fair_runtime(),
            cost: stats.cost.unwrap_or(f64::NAN),
        }
    }
}
