//! Dataset collection on disk: `<root>/<subset>/<problem>/`.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::backend::{QpSolver, SolverBackend};
use crate::catalog::{ProblemCatalog, ProblemMetadata, ProblemPaths};
use crate::error::{BenchError, Result};
use crate::fsutil::{atomic_write_json_pretty, ensure_dir};
use crate::solver_set::{SolverKind, SolverOptions};

/// Solver used to produce `_ref_sol.json` for imported problems.
pub const REFERENCE_SOLVER: SolverKind = SolverKind::PartialCondensingHpipm;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub subset: String,
    pub folders: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub without_reference: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DatasetCollection {
    root: PathBuf,
}

impl DatasetCollection {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> Result<ProblemCatalog> {
        ProblemCatalog::discover(&self.root)
    }

    /// First subset name among `preferred`, `preferred_1`, `preferred_2`, ...
    /// that does not exist yet.
    pub fn available_name(&self, preferred: &str) -> String {
        let mut name = preferred.to_string();
        let mut counter = 1;
        while self.root.join(&name).exists() {
            name = format!("{}_{}", preferred, counter);
            counter += 1;
        }
        name
    }

    /// Imports every `*.json` file of `source` as a problem of a new subset.
    /// If `preferred_name` is taken the import only proceeds when
    /// `allow_rename` is set. Files the backend cannot load are skipped.
    pub fn add_problems_from_json_folder<B: SolverBackend>(
        &self,
        backend: &B,
        source: &Path,
        preferred_name: &str,
        allow_rename: bool,
    ) -> Result<ImportReport> {
        if !source.is_dir() {
            return Err(BenchError::DatasetNotFound(source.to_path_buf()));
        }
        let subset = self.available_name(preferred_name);
        if subset != preferred_name && !allow_rename {
            return Err(BenchError::Dataset(format!(
                "subset '{}' already exists; '{}' is free (pass rename to use it)",
                preferred_name, subset
            )));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(source)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        files.sort();

        let subset_dir = self.root.join(&subset);
        ensure_dir(&subset_dir)?;
        let mut report = ImportReport {
            subset: subset.clone(),
            folders: Vec::new(),
            skipped: Vec::new(),
            without_reference: Vec::new(),
        };

        for file in files {
            let problem = match backend.load_problem(&file) {
                Ok(problem) => problem,
                Err(err) => {
                    warn!(file = %file.display(), error = %err, "cannot load problem, skipping");
                    report.skipped.push(file);
                    continue;
                }
            };
            let traits = match backend.describe_problem(&problem) {
                Ok(traits) => traits,
                Err(err) => {
                    warn!(file = %file.display(), error = %err, "cannot describe problem, skipping");
                    report.skipped.push(file);
                    continue;
                }
            };
            let (Some(stem), Some(file_name)) = (
                file.file_stem().and_then(|s| s.to_str()),
                file.file_name().and_then(|s| s.to_str()),
            ) else {
                report.skipped.push(file);
                continue;
            };

            let folder = subset_dir.join(stem);
            ensure_dir(&folder)?;
            let paths = ProblemPaths::for_folder(&folder);
            fs::copy(&file, &paths.data)?;
            let meta = ProblemMetadata {
                name: format!("{}_{}", subset, file_name),
                horizon: traits.horizon,
                has_slacks: traits.has_slacks,
                has_masks: traits.has_masks,
                has_idxs_rev_not_idxs: traits.has_idxs_rev_not_idxs,
            };
            atomic_write_json_pretty(&paths.meta, &serde_json::to_value(&meta)?)?;

            match reference_solution(backend, &problem) {
                Some(iterate) => atomic_write_json_pretty(&paths.ref_sol, &iterate)?,
                None => report.without_reference.push(folder.clone()),
            }
            info!(source = %file.display(), folder = %folder.display(), "added problem");
            report.folders.push(folder);
        }
        Ok(report)
    }
}

fn reference_solution<B: SolverBackend>(
    backend: &B,
    problem: &B::Problem,
) -> Option<serde_json::Value> {
    let options = SolverOptions::new(REFERENCE_SOLVER);
    let mut solver = match backend.create_solver(problem, &options) {
        Ok(solver) => solver,
        Err(err) => {
            warn!(error = %err, "reference solver could not be built");
            return None;
        }
    };
    match solver.solve() {
        Ok(0) => match solver.iterate() {
            Ok(iterate) => Some(iterate),
            Err(err) => {
                warn!(error = %err, "reference solve succeeded without an iterate");
                None
            }
        },
        Ok(status) => {
            warn!(status, "reference solution not found");
            None
        }
        Err(err) => {
            warn!(error = %err, "reference solve failed");
            None
        }
    }
}
