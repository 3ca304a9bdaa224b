//! Metadata predicates for narrowing a problem catalog.
//!
//! Filters are plain data so a catalog selection can be printed, stored in a
//! config file and compared, instead of hiding behind a closure.

use std::fmt;
use std::str::FromStr;

use crate::catalog::ProblemMetadata;
use crate::error::BenchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaFlag {
    HasSlacks,
    HasMasks,
    HasIdxsRevNotIdxs,
}

impl MetaFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaFlag::HasSlacks => "has_slacks",
            MetaFlag::HasMasks => "has_masks",
            MetaFlag::HasIdxsRevNotIdxs => "has_idxs_rev_not_idxs",
        }
    }

    fn read(&self, meta: &ProblemMetadata) -> bool {
        match self {
            MetaFlag::HasSlacks => meta.has_slacks,
            MetaFlag::HasMasks => meta.has_masks,
            MetaFlag::HasIdxsRevNotIdxs => meta.has_idxs_rev_not_idxs,
        }
    }

    fn parse(field: &str) -> Option<Self> {
        match field {
            "has_slacks" => Some(MetaFlag::HasSlacks),
            "has_masks" => Some(MetaFlag::HasMasks),
            "has_idxs_rev_not_idxs" => Some(MetaFlag::HasIdxsRevNotIdxs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn holds(&self, lhs: u32, rhs: u32) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetaFilter {
    Flag { flag: MetaFlag, expected: bool },
    Horizon { op: Comparison, value: u32 },
    NamePrefix(String),
    And(Vec<MetaFilter>),
    Or(Vec<MetaFilter>),
    Not(Box<MetaFilter>),
}

impl MetaFilter {
    pub fn flag(flag: MetaFlag, expected: bool) -> Self {
        MetaFilter::Flag { flag, expected }
    }

    pub fn matches(&self, meta: &ProblemMetadata) -> bool {
        match self {
            MetaFilter::Flag { flag, expected } => flag.read(meta) == *expected,
            MetaFilter::Horizon { op, value } => op.holds(meta.horizon, *value),
            MetaFilter::NamePrefix(prefix) => meta.name.starts_with(prefix.as_str()),
            MetaFilter::And(parts) => parts.iter().all(|p| p.matches(meta)),
            MetaFilter::Or(parts) => parts.iter().any(|p| p.matches(meta)),
            MetaFilter::Not(inner) => !inner.matches(meta),
        }
    }

    /// Parses every clause and joins them with `And`. An empty list matches
    /// everything.
    pub fn all_of<S: AsRef<str>>(clauses: &[S]) -> Result<Self, BenchError> {
        let parts = clauses
            .iter()
            .map(|c| c.as_ref().parse::<MetaFilter>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MetaFilter::And(parts))
    }
}

impl fmt::Display for MetaFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaFilter::Flag { flag, expected } => write!(f, "{}={}", flag.as_str(), expected),
            MetaFilter::Horizon { op, value } => write!(f, "N{}{}", op.symbol(), value),
            MetaFilter::NamePrefix(prefix) => write!(f, "name^={}", prefix),
            MetaFilter::And(parts) => join(f, parts, " and "),
            MetaFilter::Or(parts) => join(f, parts, " or "),
            MetaFilter::Not(inner) => write!(f, "not ({})", inner),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, parts: &[MetaFilter], sep: &str) -> fmt::Result {
    if parts.is_empty() {
        return write!(f, "*");
    }
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "({})", part)?;
    }
    Ok(())
}

// Longer operators first so "<=" is not read as "<" followed by "=".
const OPERATORS: [(&str, Comparison); 6] = [
    ("!=", Comparison::Ne),
    ("<=", Comparison::Le),
    (">=", Comparison::Ge),
    ("<", Comparison::Lt),
    (">", Comparison::Gt),
    ("=", Comparison::Eq),
];

impl FromStr for MetaFilter {
    type Err = BenchError;

    fn from_str(clause: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| BenchError::InvalidFilter {
            clause: clause.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = clause.trim();
        if let Some(rest) = trimmed.strip_prefix('!') {
            return Ok(MetaFilter::Not(Box::new(rest.parse()?)));
        }
        if let Some((field, prefix)) = trimmed.split_once("^=") {
            if field.trim() != "name" {
                return Err(invalid("prefix match is only supported on name"));
            }
            return Ok(MetaFilter::NamePrefix(prefix.trim().to_string()));
        }

        let (field, op, value) = OPERATORS
            .iter()
            .find_map(|(symbol, op)| {
                trimmed
                    .split_once(symbol)
                    .map(|(field, value)| (field.trim(), *op, value.trim()))
            })
            .ok_or_else(|| invalid("expected <field><op><value>"))?;

        if let Some(flag) = MetaFlag::parse(field) {
            let expected = match (op, value) {
                (Comparison::Eq, "true") | (Comparison::Ne, "false") => true,
                (Comparison::Eq, "false") | (Comparison::Ne, "true") => false,
                _ => return Err(invalid("flags support = and != with true/false")),
            };
            return Ok(MetaFilter::flag(flag, expected));
        }
        if field == "N" {
            let value = value
                .parse::<u32>()
                .map_err(|_| invalid("N must be compared with a non-negative integer"))?;
            return Ok(MetaFilter::Horizon { op, value });
        }
        Err(invalid("unknown metadata field"))
    }
}
