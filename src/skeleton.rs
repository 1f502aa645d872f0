//! Lightweight projections of structure definitions and their invariants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Index of a skeleton within one scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SkeletonId(pub usize);

/// Constraint severity as declared in the definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Error,
    Warning,
    /// Any other tier; treated like `error`.
    Other(String),
}

impl Severity {
    pub fn is_warning(&self) -> bool {
        matches!(self, Severity::Warning)
    }
}

impl From<&str> for Severity {
    fn from(value: &str) -> Self {
        match value {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            other => Severity::Other(other.to_string()),
        }
    }
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        Severity::from(value.as_str())
    }
}

impl From<Severity> for String {
    fn from(value: Severity) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Other(other) => f.write_str(other),
        }
    }
}

/// Bucket an evaluation attempt is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Fail,
    Error,
}

/// Success/fail/error counters for one invariant.
///
/// Every recorded attempt lands in exactly one bucket; counters only move
/// together through [`Tally::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub success: u32,
    pub fail: u32,
    pub error: u32,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Fail => self.fail += 1,
            Outcome::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.success + self.fail + self.error
    }

    pub fn reset(&mut self) {
        *self = Tally::default();
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.success, self.fail, self.error)
    }
}

/// One declared constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantSkeleton {
    pub key: String,
    pub severity: Severity,
    /// Context expression; empty means the whole resource.
    pub context: String,
    pub expression: String,
    pub human: Option<String>,
    pub tally: Tally,
}

impl InvariantSkeleton {
    pub fn new(
        key: impl Into<String>,
        severity: impl Into<Severity>,
        context: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            severity: severity.into(),
            context: context.into(),
            expression: expression.into(),
            human: None,
            tally: Tally::default(),
        }
    }
}

/// One resource or profile definition found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureDefinitionSkeleton {
    pub filename: PathBuf,
    pub resource_type: Option<String>,
    pub canonical_url: Option<String>,
    pub is_profile: bool,
    pub is_data_type: bool,
    /// Declaration order.
    pub invariants: Vec<InvariantSkeleton>,
}

impl StructureDefinitionSkeleton {
    pub fn new(filename: impl Into<PathBuf>, resource_type: Option<String>) -> Self {
        Self {
            filename: filename.into(),
            resource_type,
            canonical_url: None,
            is_profile: false,
            is_data_type: false,
            invariants: Vec::new(),
        }
    }

    /// Zero every invariant's counters.
    pub fn reset_stats(&mut self) {
        for inv in &mut self.invariants {
            inv.tally.reset();
        }
    }

    /// The type name, or an empty string for definitions without one.
    pub fn type_name(&self) -> &str {
        self.resource_type.as_deref().unwrap_or("")
    }

    pub fn has_errors(&self) -> bool {
        self.invariants.iter().any(|i| i.tally.error > 0)
    }
}
