//! Solver configurations and their identities.
//!
//! A configuration is a solver kind plus the tunable options from
//! [`OPTION_REGISTRY`]. Its identity is the kind name followed by every
//! option that differs from its registry default, so default runs keep the
//! plain kind name in the results table.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{BenchError, Result};

/// Solver kinds the harness knows how to benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SolverKind {
    PartialCondensingHpipm,
    FullCondensingQpoases,
    FullCondensingHpipm,
    PartialCondensingQpdunes,
    PartialCondensingOsqp,
    PartialCondensingClarabel,
    FullCondensingDaqp,
}

impl SolverKind {
    pub const ALL: [SolverKind; 7] = [
        SolverKind::PartialCondensingHpipm,
        SolverKind::FullCondensingQpoases,
        SolverKind::FullCondensingHpipm,
        SolverKind::PartialCondensingQpdunes,
        SolverKind::PartialCondensingOsqp,
        SolverKind::PartialCondensingClarabel,
        SolverKind::FullCondensingDaqp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::PartialCondensingHpipm => "PARTIAL_CONDENSING_HPIPM",
            SolverKind::FullCondensingQpoases => "FULL_CONDENSING_QPOASES",
            SolverKind::FullCondensingHpipm => "FULL_CONDENSING_HPIPM",
            SolverKind::PartialCondensingQpdunes => "PARTIAL_CONDENSING_QPDUNES",
            SolverKind::PartialCondensingOsqp => "PARTIAL_CONDENSING_OSQP",
            SolverKind::PartialCondensingClarabel => "PARTIAL_CONDENSING_CLARABEL",
            SolverKind::FullCondensingDaqp => "FULL_CONDENSING_DAQP",
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolverKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        SolverKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| BenchError::UnknownSolverKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpipmMode {
    Balance,
    Speed,
    SpeedAbs,
    Robust,
}

impl HpipmMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HpipmMode::Balance => "BALANCE",
            HpipmMode::Speed => "SPEED",
            HpipmMode::SpeedAbs => "SPEED_ABS",
            HpipmMode::Robust => "ROBUST",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "BALANCE" => Some(HpipmMode::Balance),
            "SPEED" => Some(HpipmMode::Speed),
            "SPEED_ABS" => Some(HpipmMode::SpeedAbs),
            "ROBUST" => Some(HpipmMode::Robust),
            _ => None,
        }
    }
}

/// Value of a single tunable option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Int(i64),
    Float(f64),
    Text(String),
    Unset,
}

impl OptionValue {
    /// Renders the value for identities; magnitudes below 0.01 use
    /// scientific notation (`1e-10`).
    pub fn render(&self) -> String {
        match self {
            OptionValue::Int(v) => v.to_string(),
            OptionValue::Float(v) => format_float(*v),
            OptionValue::Text(s) => s.clone(),
            OptionValue::Unset => "none".to_string(),
        }
    }

    fn as_int(&self, name: &str) -> Result<i64> {
        match self {
            OptionValue::Int(v) => Ok(*v),
            OptionValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Ok(*v as i64),
            other => Err(BenchError::invalid_value(
                name,
                format!("expected an integer, got {:?}", other),
            )),
        }
    }

    fn as_float(&self, name: &str) -> Result<f64> {
        match self {
            OptionValue::Float(v) => Ok(*v),
            OptionValue::Int(v) => Ok(*v as f64),
            other => Err(BenchError::invalid_value(
                name,
                format!("expected a number, got {:?}", other),
            )),
        }
    }
}

pub(crate) fn format_float(v: f64) -> String {
    if v != 0.0 && v.abs() < SCIENTIFIC_THRESHOLD {
        format!("{:e}", v)
    } else {
        v.to_string()
    }
}

const SCIENTIFIC_THRESHOLD: f64 = 0.01;

/// Tunable options of one solver configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    pub qp_solver: SolverKind,
    pub hpipm_mode: HpipmMode,
    pub iter_max: i64,
    pub tol_stat: f64,
    pub tol_eq: f64,
    pub tol_ineq: f64,
    pub tol_comp: f64,
    /// Horizon after partial condensing; `None` keeps the problem horizon.
    pub cond_n: Option<i64>,
    pub warm_start: i64,
    pub print_level: i64,
}

impl SolverOptions {
    pub fn new(qp_solver: SolverKind) -> Self {
        Self {
            qp_solver,
            hpipm_mode: HpipmMode::Balance,
            iter_max: 1000,
            tol_stat: 1e-8,
            tol_eq: 1e-8,
            tol_ineq: 1e-8,
            tol_comp: 1e-8,
            cond_n: None,
            warm_start: 0,
            print_level: 0,
        }
    }

    pub fn get(&self, name: &str) -> Result<OptionValue> {
        let spec = option_spec(name)?;
        Ok((spec.get)(self))
    }

    pub fn set(&mut self, name: &str, value: OptionValue) -> Result<()> {
        let spec = option_spec(name)?;
        (spec.set)(self, value)
    }

    /// Deterministic identity: kind name, then `name=value` for each
    /// registry option that differs from its default, joined by `_`.
    pub fn identity(&self) -> String {
        let defaults = SolverOptions::new(self.qp_solver);
        let mut parts = vec![self.qp_solver.as_str().to_string()];
        for spec in OPTION_REGISTRY {
            let value = (spec.get)(self);
            if value != (spec.get)(&defaults) {
                parts.push(format!("{}={}", spec.name, value.render()));
            }
        }
        parts.join("_")
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(
            "qp_solver".to_string(),
            serde_json::Value::String(self.qp_solver.as_str().to_string()),
        );
        for spec in OPTION_REGISTRY {
            let value = match (spec.get)(self) {
                OptionValue::Int(v) => serde_json::json!(v),
                OptionValue::Float(v) => serde_json::json!(v),
                OptionValue::Text(s) => serde_json::Value::String(s),
                OptionValue::Unset => serde_json::Value::Null,
            };
            map.insert(spec.name.to_string(), value);
        }
        serde_json::Value::Object(map)
    }
}

/// One entry of the option registry. Defaults come from
/// [`SolverOptions::new`], which is the single place they are declared.
pub struct OptionSpec {
    pub name: &'static str,
    get: fn(&SolverOptions) -> OptionValue,
    set: fn(&mut SolverOptions, OptionValue) -> Result<()>,
}

/// Tunable options in identity order.
pub static OPTION_REGISTRY: &[OptionSpec] = &[
    OptionSpec {
        name: "hpipm_mode",
        get: |o| OptionValue::Text(o.hpipm_mode.as_str().to_string()),
        set: |o, v| {
            let mode = match &v {
                OptionValue::Text(s) => HpipmMode::parse(s),
                _ => None,
            };
            o.hpipm_mode = mode.ok_or_else(|| {
                BenchError::invalid_value("hpipm_mode", format!("unknown mode {:?}", v))
            })?;
            Ok(())
        },
    },
    OptionSpec {
        name: "iter_max",
        get: |o| OptionValue::Int(o.iter_max),
        set: |o, v| {
            let n = v.as_int("iter_max")?;
            if n < 1 {
                return Err(BenchError::invalid_value("iter_max", "must be at least 1"));
            }
            o.iter_max = n;
            Ok(())
        },
    },
    OptionSpec {
        name: "tol_stat",
        get: |o| OptionValue::Float(o.tol_stat),
        set: |o, v| {
            o.tol_stat = positive_tolerance("tol_stat", &v)?;
            Ok(())
        },
    },
    OptionSpec {
        name: "tol_eq",
        get: |o| OptionValue::Float(o.tol_eq),
        set: |o, v| {
            o.tol_eq = positive_tolerance("tol_eq", &v)?;
            Ok(())
        },
    },
    OptionSpec {
        name: "tol_ineq",
        get: |o| OptionValue::Float(o.tol_ineq),
        set: |o, v| {
            o.tol_ineq = positive_tolerance("tol_ineq", &v)?;
            Ok(())
        },
    },
    OptionSpec {
        name: "tol_comp",
        get: |o| OptionValue::Float(o.tol_comp),
        set: |o, v| {
            o.tol_comp = positive_tolerance("tol_comp", &v)?;
            Ok(())
        },
    },
    OptionSpec {
        name: "cond_N",
        get: |o| o.cond_n.map(OptionValue::Int).unwrap_or(OptionValue::Unset),
        set: |o, v| {
            o.cond_n = match v {
                OptionValue::Unset => None,
                other => Some(other.as_int("cond_N")?),
            };
            Ok(())
        },
    },
    OptionSpec {
        name: "warm_start",
        get: |o| OptionValue::Int(o.warm_start),
        set: |o, v| {
            o.warm_start = v.as_int("warm_start")?;
            Ok(())
        },
    },
    OptionSpec {
        name: "print_level",
        get: |o| OptionValue::Int(o.print_level),
        set: |o, v| {
            o.print_level = v.as_int("print_level")?;
            Ok(())
        },
    },
];

fn positive_tolerance(name: &str, v: &OptionValue) -> Result<f64> {
    let tol = v.as_float(name)?;
    if !(tol > 0.0 && tol.is_finite()) {
        return Err(BenchError::invalid_value(name, "must be a positive finite number"));
    }
    Ok(tol)
}

fn option_spec(name: &str) -> Result<&'static OptionSpec> {
    OPTION_REGISTRY
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| BenchError::UnknownOption(name.to_string()))
}

/// Builds options for `kind`, applying `overrides` in order. Any unknown
/// option name fails immediately.
pub fn create_solver_options(
    kind: SolverKind,
    overrides: &[(&str, OptionValue)],
) -> Result<SolverOptions> {
    let mut opts = SolverOptions::new(kind);
    for (name, value) in overrides {
        opts.set(name, value.clone())?;
    }
    Ok(opts)
}

pub const DEFAULT_SETTINGS_LABEL: &str = "default";

/// A configuration to benchmark together with the settings label written to
/// the results table.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfiguration {
    pub options: SolverOptions,
    pub settings: String,
}

impl SolverConfiguration {
    pub fn new(options: SolverOptions) -> Self {
        Self {
            options,
            settings: DEFAULT_SETTINGS_LABEL.to_string(),
        }
    }

    pub fn with_settings(mut self, settings: impl Into<String>) -> Self {
        self.settings = settings.into();
        self
    }

    pub fn kind(&self) -> SolverKind {
        self.options.qp_solver
    }

    pub fn solver_id(&self) -> String {
        self.options.identity()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SolverConfigSet {
    configs: Vec<SolverConfiguration>,
}

impl SolverConfigSet {
    pub fn new(configs: Vec<SolverConfiguration>) -> Self {
        Self { configs }
    }

    pub fn from_options(options: Vec<SolverOptions>) -> Self {
        Self::new(options.into_iter().map(SolverConfiguration::new).collect())
    }

    /// Builds default configurations for every known kind in `names`,
    /// crossed with `settings`. Unknown and repeated names are dropped.
    pub fn from_kind_names<S: AsRef<str>>(names: &[S], settings: &[S]) -> Self {
        let mut seen = BTreeSet::new();
        let mut kinds = Vec::new();
        for name in names {
            match name.as_ref().parse::<SolverKind>() {
                Ok(kind) => {
                    if seen.insert(kind) {
                        kinds.push(kind);
                    }
                }
                Err(_) => warn!(solver = name.as_ref(), "dropping unknown solver kind"),
            }
        }
        let labels: Vec<String> = if settings.is_empty() {
            vec![DEFAULT_SETTINGS_LABEL.to_string()]
        } else {
            settings.iter().map(|s| s.as_ref().to_string()).collect()
        };

        let mut configs = Vec::new();
        for kind in kinds {
            for label in &labels {
                configs.push(SolverConfiguration::new(SolverOptions::new(kind)).with_settings(label));
            }
        }
        Self::new(configs)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SolverConfiguration> {
        self.configs.iter()
    }

    pub fn solver_ids(&self) -> Vec<String> {
        self.configs.iter().map(|c| c.solver_id()).collect()
    }
}

impl<'a> IntoIterator for &'a SolverConfigSet {
    type Item = &'a SolverConfiguration;
    type IntoIter = std::slice::Iter<'a, SolverConfiguration>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}
