//! Benchmark harness for OCP-QP solvers: a filterable problem catalog,
//! deterministic solver-configuration identities, an incrementally persisted
//! results ledger and the sweep that ties them together.

pub mod backend;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod error;
pub mod filter;
mod fsutil;
pub mod labels;
pub mod ledger;
pub mod process;
pub mod profile;
pub mod runner;
pub mod solver_set;
pub mod table;

pub use backend::{ProblemTraits, QpSolver, SolveStatistics, SolverBackend};
pub use catalog::{ProblemCatalog, ProblemMetadata, ProblemPaths};
pub use collection::{DatasetCollection, ImportReport};
pub use config::{BenchConfig, BenchSummary};
pub use error::{BenchError, Result};
pub use filter::{Comparison, MetaFilter, MetaFlag};
pub use labels::{generate_labels, shorten_solver_name};
pub use ledger::{Outcome, ResultsLedger};
pub use process::ProcessBackend;
pub use profile::{performance_profile, Metric, Profile, ProfileCurve};
pub use runner::{BenchmarkRunner, Progress, RunOptions, RunSummary};
pub use solver_set::{
    create_solver_options, OptionValue, SolverConfigSet, SolverConfiguration, SolverKind,
    SolverOptions, OPTION_REGISTRY,
};
pub use table::{RunRecord, TableFormat};
