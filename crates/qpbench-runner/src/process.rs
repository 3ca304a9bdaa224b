//! [`SolverBackend`] that delegates to an external harness process.
//!
//! Each call launches the configured command, writes one JSON request to its
//! stdin and reads the last JSON line of its stdout as the reply. Requests
//! look like `{"mode": "solve", "problem": <path>, "options": {...}}` or
//! `{"mode": "describe", "problem": <path>}`. A reply carrying an `error`
//! field is a failure. Process start-up and problem setup happen inside the
//! solve call, so a solve reply should carry `time_external`, the time of the
//! solver call alone.

use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backend::{ProblemTraits, QpSolver, SolveStatistics, SolverBackend};
use crate::error::{BenchError, Result};
use crate::fsutil::normalize_path;
use crate::solver_set::SolverOptions;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
struct HarnessCommand {
    argv: Vec<String>,
    timeout: Option<Duration>,
}

impl HarnessCommand {
    fn call(&self, request: &Value) -> anyhow::Result<Value> {
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning harness {}", self.argv[0]))?;
        if let Some(mut stdin) = child.stdin.take() {
            // The harness may exit without reading its input.
            let _ = stdin.write_all(&serde_json::to_vec(request)?);
        }
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("harness stdout was not captured"))?;
        let reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            buf
        });

        let status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => match wait_timeout(&mut child, timeout)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = reader.join();
                    bail!("harness timed out after {:.3}s", timeout.as_secs_f64());
                }
            },
        };
        let stdout = reader
            .join()
            .map_err(|_| anyhow!("harness stdout reader panicked"))?;

        let reply = last_json_line(&stdout)
            .ok_or_else(|| anyhow!("harness exited ({}) without a JSON reply", describe_exit(status)))?;
        if let Some(err) = reply.get("error") {
            bail!("harness reported an error: {}", err);
        }
        Ok(reply)
    }
}

fn wait_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn describe_exit(status: ExitStatus) -> String {
    status
        .code()
        .map(|c| format!("exit code {}", c))
        .unwrap_or_else(|| "signal".to_string())
}

fn last_json_line(stdout: &str) -> Option<Value> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find_map(|l| serde_json::from_str::<Value>(l).ok())
}

/// Runs problems through an external harness, one process per request.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    harness: HarnessCommand,
}

impl ProcessBackend {
    /// Resolves path-like command parts against `base_dir` and checks that
    /// the harness entry point exists.
    pub fn new(command: &[String], base_dir: &Path, timeout: Option<Duration>) -> Result<Self> {
        if command.is_empty() {
            return Err(BenchError::Backend(anyhow!("harness command is empty")));
        }
        let argv = resolve_command_local(command, base_dir);
        validate_harness_command(&argv)?;
        Ok(Self {
            harness: HarnessCommand { argv, timeout },
        })
    }

    pub fn command(&self) -> &[String] {
        &self.harness.argv
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.harness.timeout
    }
}

#[derive(Debug, Clone)]
pub struct ProcessProblem {
    pub data: PathBuf,
}

pub struct ProcessSolver {
    harness: HarnessCommand,
    request: Value,
    stats: SolveStatistics,
    iterate: Option<Value>,
}

impl QpSolver for ProcessSolver {
    fn solve(&mut self) -> anyhow::Result<i64> {
        let reply = self.harness.call(&self.request)?;
        let status = reply
            .get("status")
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("harness reply has no integer status: {}", reply))?;
        self.stats = serde_json::from_value(reply.clone())
            .context("harness reply has malformed statistics")?;
        self.iterate = reply.get("iterate").cloned();
        Ok(status)
    }

    fn statistics(&self) -> SolveStatistics {
        self.stats
    }

    fn iterate(&self) -> anyhow::Result<Value> {
        self.iterate
            .clone()
            .ok_or_else(|| anyhow!("harness returned no iterate"))
    }
}

impl SolverBackend for ProcessBackend {
    type Problem = ProcessProblem;
    type Solver = ProcessSolver;

    fn load_problem(&self, data: &Path) -> anyhow::Result<ProcessProblem> {
        let bytes = fs::read(data).with_context(|| format!("reading {}", data.display()))?;
        let value: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing {}", data.display()))?;
        if !value.is_object() {
            bail!("{} does not hold a JSON object", data.display());
        }
        Ok(ProcessProblem {
            data: data.to_path_buf(),
        })
    }

    fn create_solver(
        &self,
        problem: &ProcessProblem,
        options: &SolverOptions,
    ) -> anyhow::Result<ProcessSolver> {
        debug!(problem = %problem.data.display(), solver = %options.identity(), "preparing harness solve");
        Ok(ProcessSolver {
            harness: self.harness.clone(),
            request: json!({
                "mode": "solve",
                "problem": problem.data.display().to_string(),
                "options": options.to_json(),
            }),
            stats: SolveStatistics::default(),
            iterate: None,
        })
    }

    fn describe_problem(&self, problem: &ProcessProblem) -> anyhow::Result<ProblemTraits> {
        let reply = self.harness.call(&json!({
            "mode": "describe",
            "problem": problem.data.display().to_string(),
        }))?;
        serde_json::from_value(reply).context("harness describe reply is malformed")
    }
}

fn resolve_command_local(command: &[String], base_dir: &Path) -> Vec<String> {
    command
        .iter()
        .map(|part| {
            let p = Path::new(part);
            if p.is_relative() && command_part_looks_like_path(part) {
                normalize_path(&base_dir.join(p)).to_string_lossy().to_string()
            } else {
                part.clone()
            }
        })
        .collect()
}

fn resolve_command_script_path(command: &[String]) -> Option<PathBuf> {
    let candidate = if command_part_looks_like_path(&command[0]) {
        &command[0]
    } else if command.len() >= 2 && command_part_looks_like_path(&command[1]) {
        &command[1]
    } else {
        return None;
    };
    if candidate.is_empty() {
        return None;
    }
    Some(normalize_path(Path::new(candidate)))
}

fn validate_harness_command(command: &[String]) -> Result<()> {
    if let Some(p) = resolve_command_script_path(command) {
        if !p.exists() {
            return Err(BenchError::Backend(anyhow!(
                "harness command file not found: {} (update harness.command)",
                p.display()
            )));
        }
    }
    Ok(())
}

fn command_part_looks_like_path(part: &str) -> bool {
    part.starts_with('.')
        || part.starts_with('/')
        || part.contains('/')
        || part.ends_with(".py")
        || part.ends_with(".sh")
}
