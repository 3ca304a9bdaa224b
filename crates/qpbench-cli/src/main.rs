use anyhow::Result;
use clap::{Parser, Subcommand};
use qpbench_runner::{
    performance_profile, BenchConfig, BenchError, BenchSummary, BenchmarkRunner, ImportReport,
    MetaFilter, Metric, Profile, ProblemCatalog, Progress, ResultsLedger, RunSummary,
};
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qpbench", version = "0.3.0", about = "OCP-QP solver benchmark harness")]
struct Cli {
    /// Raise the default log level to debug.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured solver on every selected problem.
    Run {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show what a configuration would run.
    Describe {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List the problems of a dataset collection.
    Problems {
        #[arg(long)]
        dataset: PathBuf,
        /// Metadata clause such as `has_masks=false` or `N>=20`; repeatable.
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show the plot label of each configured solver.
    Labels {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Compute performance-profile curves from the results table.
    Profile {
        config: PathBuf,
        #[arg(long, default_value = "runtime_fair")]
        metric: String,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Import a folder of JSON problems as a new subset of the collection.
    Import {
        config: PathBuf,
        #[arg(long)]
        source: PathBuf,
        #[arg(long, default_value = "qps")]
        name: String,
        /// Accept a numbered name if the preferred one is taken.
        #[arg(long)]
        rename: bool,
        #[arg(long)]
        json: bool,
    },
}

const LOG_ENV: &str = "QPBENCH_LOG";

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error(error_code(&err), err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run { config, json } => {
            let config = BenchConfig::load(&config)?;
            let summary = config.describe()?;
            let catalog = config.catalog()?;
            let solvers = config.solver_set()?;
            let backend = config.backend()?;
            let mut ledger = ResultsLedger::open(config.results_path().as_deref(), &catalog)?;
            let runner = BenchmarkRunner::new(&backend, config.run_options());
            let show_progress = !json && config.run.print_level > 0;
            let result = runner.run_with_progress(&catalog, &solvers, &mut ledger, |p| {
                if show_progress {
                    print_progress(p);
                }
            })?;
            if show_progress {
                eprintln!();
            }
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "summary": serde_json::to_value(&summary)?,
                    "run": serde_json::to_value(&result)?,
                })));
            }
            print_summary(&summary);
            print_run_summary(&result);
        }
        Commands::Describe { config, json } => {
            let summary = BenchConfig::load(&config)?.describe()?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "summary": serde_json::to_value(&summary)?,
                })));
            }
            print_summary(&summary);
        }
        Commands::Problems {
            dataset,
            filters,
            json,
        } => {
            let problems = list_problems(&dataset, &filters)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "problems",
                    "dataset": dataset.display().to_string(),
                    "problems": problems,
                })));
            }
            for p in &problems {
                println!(
                    "{}  N={}  slacks={}  masks={}  idxs_rev={}  ref_sol={}",
                    p["name"].as_str().unwrap_or(""),
                    p["N"],
                    p["has_slacks"],
                    p["has_masks"],
                    p["has_idxs_rev_not_idxs"],
                    p["has_reference_solution"]
                );
            }
            println!("problems: {}", problems.len());
        }
        Commands::Labels { config, json } => {
            let config = BenchConfig::load(&config)?;
            let solvers = config.solver_set()?;
            let labels = config.labels(&solvers);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "labels",
                    "labels": labels,
                })));
            }
            for solver_id in solvers.solver_ids() {
                let label = labels.get(&solver_id).map(String::as_str).unwrap_or("");
                println!("{}: {}", solver_id, label);
            }
        }
        Commands::Profile {
            config,
            metric,
            out,
            json,
        } => {
            let metric: Metric = metric.parse()?;
            let config = BenchConfig::load(&config)?;
            let catalog = config.catalog()?;
            let solvers = config.solver_set()?;
            let ledger = ResultsLedger::open(config.results_path().as_deref(), &catalog)?;
            let ids = solvers.solver_ids();
            let profile = performance_profile(
                ledger.rows(),
                metric,
                Some(ids.as_slice()),
                &config.labels(&solvers),
                catalog.count_problems(),
                catalog.title(),
            );
            if let Some(out) = &out {
                profile.write_json(out)?;
            }
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "profile",
                    "out": out.as_ref().map(|p| p.display().to_string()),
                    "profile": serde_json::to_value(&profile)?,
                })));
            }
            print_profile(&profile);
            if let Some(out) = &out {
                println!("profile_written: {}", out.display());
            }
        }
        Commands::Import {
            config,
            source,
            name,
            rename,
            json,
        } => {
            let config = BenchConfig::load(&config)?;
            let backend = config.backend()?;
            let report = config
                .collection()
                .add_problems_from_json_folder(&backend, &source, &name, rename)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "import",
                    "import": serde_json::to_value(&report)?,
                })));
            }
            print_import(&report);
        }
    }
    Ok(None)
}

fn list_problems(dataset: &Path, filters: &[String]) -> Result<Vec<Value>> {
    let mut catalog = ProblemCatalog::discover(dataset)?;
    if !filters.is_empty() {
        catalog = catalog.filter_by_meta(&MetaFilter::all_of(filters)?)?;
    }
    let mut out = Vec::new();
    for paths in catalog.iter() {
        let meta = paths.load_metadata()?;
        out.push(json!({
            "name": meta.problem_name(),
            "folder": paths.folder.display().to_string(),
            "N": meta.horizon,
            "has_slacks": meta.has_slacks,
            "has_masks": meta.has_masks,
            "has_idxs_rev_not_idxs": meta.has_idxs_rev_not_idxs,
            "has_reference_solution": paths.has_reference_solution(),
        }));
    }
    Ok(out)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn error_code(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<BenchError>() {
        Some(BenchError::UnknownOption(_))
        | Some(BenchError::InvalidOptionValue { .. })
        | Some(BenchError::UnknownSolverKind(_))
        | Some(BenchError::Config(_))
        | Some(BenchError::Yaml(_)) => "configuration_error",
        Some(BenchError::DatasetNotFound(_)) | Some(BenchError::Metadata { .. }) => "catalog_error",
        Some(BenchError::InvalidFilter { .. }) => "invalid_filter",
        Some(BenchError::UnsupportedFormat(_)) | Some(BenchError::NoResultsPath) => "results_error",
        Some(BenchError::Unsupported(_)) => "unsupported",
        Some(BenchError::Dataset(_)) => "dataset_error",
        Some(BenchError::Backend(_)) => "backend_error",
        Some(_) => "io_error",
        None => "command_failed",
    }
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. }
        | Commands::Describe { json, .. }
        | Commands::Problems { json, .. }
        | Commands::Labels { json, .. }
        | Commands::Profile { json, .. }
        | Commands::Import { json, .. } => *json,
    }
}

fn print_progress(progress: &Progress) {
    let mut stderr = std::io::stderr();
    let _ = write!(
        stderr,
        "\r[{}/{}] solver: {}, settings: {}",
        progress.completed, progress.total, progress.active_solver, progress.settings
    );
    let _ = stderr.flush();
}

fn print_summary(summary: &BenchSummary) {
    println!("dataset: {}", summary.dataset.display());
    if !summary.description.is_empty() {
        println!("description: {}", summary.description);
    }
    println!("filter: {}", summary.filter);
    println!("problems: {}", summary.problems);
    println!("solver_configurations: {}", summary.solvers.len());
    for s in &summary.solvers {
        println!("  - {} [{}]", s.solver_id, s.settings);
    }
    println!("total_pairs: {}", summary.total_pairs);
    match &summary.results_path {
        Some(p) => println!(
            "results: {} ({})",
            p.display(),
            summary.results_format.unwrap_or("unknown")
        ),
        None => println!("results: none"),
    }
    println!("repeat_times: {}", summary.repeat_times);
    println!("iter_cap: {}", summary.iter_cap);
    println!("print_level: {}", summary.print_level);
    if let Some(command) = &summary.harness_command {
        println!("harness: {:?}", command);
    }
    if let Some(timeout) = summary.harness_timeout_seconds {
        println!("harness_timeout_seconds: {}", timeout);
    }
}

fn print_run_summary(summary: &RunSummary) {
    println!("pairs: {}", summary.pairs);
    println!("solved: {}", summary.solved);
    println!("failed_status: {}", summary.failed_status);
    println!("solver_errors: {}", summary.sentinel);
}

fn print_profile(profile: &Profile) {
    println!("metric: {}", profile.metric);
    if !profile.title.is_empty() {
        println!("title: {}", profile.title);
    }
    println!("problems: {}", profile.problem_count);
    println!("max_value: {}", profile.max_value);
    for curve in &profile.curves {
        let solved = curve.solved.last().copied().unwrap_or(0);
        let fastest = curve.values.first().copied().unwrap_or(f64::NAN);
        println!(
            "  {}: solved {}/{}, best {}",
            curve.label, solved, profile.problem_count, fastest
        );
    }
}

fn print_import(report: &ImportReport) {
    println!("subset: {}", report.subset);
    for folder in &report.folders {
        println!("added: {}", folder.display());
    }
    for file in &report.skipped {
        println!("skipped: {}", file.display());
    }
    for folder in &report.without_reference {
        println!("no_reference_solution: {}", folder.display());
    }
    println!("imported: {}", report.folders.len());
}
