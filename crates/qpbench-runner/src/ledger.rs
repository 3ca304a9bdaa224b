//! Results ledger: the persisted results table, split into rows for the
//! active catalog and rows for every other problem.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::catalog::{ProblemCatalog, ProblemMetadata};
use crate::error::{BenchError, Result};
use crate::table::{RunRecord, TableFormat};

/// Measured outcome of one (problem, configuration) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub status: i64,
    pub iterations: i64,
    pub runtime_external: f64,
    pub runtime_internal: f64,
    pub runtime_fair: f64,
    pub cost: f64,
}

/// Status recorded when no solver status exists for a pair.
pub const STATUS_UNKNOWN: i64 = -1;

impl Outcome {
    /// Outcome recorded when the solver could not be built or the solve call
    /// itself failed.
    pub fn sentinel() -> Self {
        Self {
            status: STATUS_UNKNOWN,
            iterations: -1,
            runtime_external: -1.0,
            runtime_internal: -1.0,
            runtime_fair: -1.0,
            cost: f64::NAN,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.status < 0
            && self.iterations == -1
            && self.runtime_external == -1.0
            && self.runtime_internal == -1.0
            && self.runtime_fair == -1.0
            && self.cost.is_nan()
    }

    fn into_record(self, problem: &str, solver: &str, settings: &str) -> RunRecord {
        RunRecord {
            problem: problem.to_string(),
            solver: solver.to_string(),
            settings: settings.to_string(),
            cost: self.cost,
            iterations: self.iterations,
            runtime_external: self.runtime_external,
            runtime_internal: self.runtime_internal,
            runtime_fair: self.runtime_fair,
            status: self.status,
        }
    }
}

#[derive(Debug)]
pub struct ResultsLedger {
    path: Option<PathBuf>,
    in_scope: Vec<RunRecord>,
    complementary: Vec<RunRecord>,
}

impl ResultsLedger {
    /// Loads the table at `path` (if any) and keeps the rows of problems in
    /// `catalog` editable. A missing file is created empty right away; an
    /// unreadable one is moved aside and the ledger starts empty.
    pub fn open(path: Option<&Path>, catalog: &ProblemCatalog) -> Result<Self> {
        let rows = match path {
            Some(path) => load_or_initialize(path)?,
            None => Vec::new(),
        };
        let problems: BTreeSet<String> = catalog.problem_names()?.into_iter().collect();
        let (in_scope, complementary): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .partition(|row| problems.contains(&row.problem));
        debug!(
            in_scope = in_scope.len(),
            complementary = complementary.len(),
            "partitioned results table"
        );
        Ok(Self {
            path: path.map(Path::to_path_buf),
            in_scope,
            complementary,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rows of problems in the active catalog.
    pub fn rows(&self) -> &[RunRecord] {
        &self.in_scope
    }

    pub fn complementary_rows(&self) -> &[RunRecord] {
        &self.complementary
    }

    /// Replaces the row for `(problem, solver_id, settings)`, where the
    /// problem name is read from the metadata file at `meta_path`.
    pub fn update(
        &mut self,
        meta_path: &Path,
        solver_id: &str,
        settings: &str,
        outcome: &Outcome,
    ) -> Result<()> {
        let meta = ProblemMetadata::load(meta_path)?;
        self.update_problem(meta.problem_name(), solver_id, settings, outcome);
        Ok(())
    }

    pub fn update_problem(
        &mut self,
        problem: &str,
        solver_id: &str,
        settings: &str,
        outcome: &Outcome,
    ) {
        self.in_scope
            .retain(|row| !row.same_identity(problem, solver_id, settings));
        self.in_scope
            .push(outcome.into_record(problem, solver_id, settings));
    }

    /// Every row, editable and complementary, sorted by
    /// `(problem, solver, settings)`.
    pub fn merged_rows(&self) -> Vec<RunRecord> {
        let mut rows: Vec<RunRecord> = self
            .in_scope
            .iter()
            .chain(self.complementary.iter())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        rows
    }

    /// Writes the merged table to `path`, or to the ledger's own path.
    pub fn write(&self, path: Option<&Path>) -> Result<()> {
        let target = path
            .or(self.path.as_deref())
            .ok_or(BenchError::NoResultsPath)?;
        let format = TableFormat::from_path(target)?;
        let rows = self.merged_rows();
        format.write(target, &rows)?;
        info!(path = %target.display(), rows = rows.len(), "wrote results table");
        Ok(())
    }
}

fn load_or_initialize(path: &Path) -> Result<Vec<RunRecord>> {
    let format = TableFormat::from_path(path)?;
    if !path.exists() {
        warn!(
            path = %path.display(),
            "results file does not exist, initializing empty results"
        );
        format.write(path, &[])?;
        return Ok(Vec::new());
    }
    match format.read(path) {
        Ok(rows) => Ok(rows),
        Err(err) => {
            let backup = backup_path(path, Utc::now());
            match fs::rename(path, &backup) {
                Ok(()) => {
                    warn!(
                        path = %path.display(),
                        backup = %backup.display(),
                        error = %err,
                        "results file unreadable, moved aside and starting empty"
                    );
                    if let Err(write_err) = format.write(path, &[]) {
                        warn!(path = %path.display(), error = %write_err, "could not reinitialize results file");
                    }
                }
                // The unreadable file stays until the first checkpoint replaces it.
                Err(rename_err) => warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %err,
                    rename_error = %rename_err,
                    "results file unreadable and could not be moved aside, starting empty"
                ),
            }
            Ok(Vec::new())
        }
    }
}

fn backup_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    path.with_file_name(format!(
        "{}.corrupt-{}",
        path.file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("results"),
        at.format("%Y%m%d_%H%M%S")
    ))
}
