//! Structured diagnostic events.
//!
//! The scanner and harness describe what happened as [`Diagnostic`] values
//! and hand them to a [`DiagnosticSink`]; counting never depends on how (or
//! whether) a sink renders them.

use crate::harness::Verdict;
use crate::validation::Issue;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

/// An invariant affected by a dependent-type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentImpact {
    pub key: String,
    /// The referencing element sits inside the invariant's context.
    pub nested: bool,
}

/// Identifies an invariant in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantLabel {
    pub key: String,
    pub severity: String,
    pub context: String,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A definition source could not be read or parsed; the scan continues.
    DefinitionSkipped { path: PathBuf, message: String },

    /// An element reuses another element's shape and existing invariants
    /// are scoped to the referenced path.
    DependentType {
        resource_type: String,
        element_path: String,
        content_reference: String,
        impacts: Vec<DependentImpact>,
    },

    /// A file is about to be tested.
    Testing { resource: String, file: PathBuf },

    /// An example or fixture could not be read or parsed.
    FileSkipped { file: PathBuf, message: String },

    /// Residual structural issues reported by the validator.
    Validation { file: PathBuf, issues: Vec<Issue> },

    /// An evaluation landed in the error bucket.
    Unexpected {
        invariant: InvariantLabel,
        verdict: Option<Verdict>,
    },

    /// Compiling or evaluating an invariant failed.
    InvariantFailed {
        invariant: InvariantLabel,
        message: String,
    },

    /// Enumerating a definition's files failed; the next definition runs.
    DefinitionFailed { resource_type: String, message: String },

    /// A fixture directory was created and seeded from the default example.
    FixturesSeeded { directory: PathBuf, count: usize },
}

impl Diagnostic {
    /// Whether the event represents a problem rather than progress.
    pub fn is_problem(&self) -> bool {
        !matches!(
            self,
            Diagnostic::Testing { .. } | Diagnostic::FixturesSeeded { .. } | Diagnostic::DependentType { .. }
        )
    }
}

impl fmt::Display for InvariantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})  {}  {}",
            self.key, self.severity, self.context, self.expression
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DefinitionSkipped { path, message } => {
                write!(f, "skipped definition {}: {}", path.display(), message)
            }
            Diagnostic::DependentType {
                resource_type,
                element_path,
                content_reference,
                impacts,
            } => {
                write!(
                    f,
                    "     Dependent Type: {} {} uses path {}",
                    resource_type, element_path, content_reference
                )?;
                for impact in impacts {
                    write!(f, "\n       impacts {}", impact.key)?;
                    if impact.nested {
                        write!(f, "\n       impacts {} nested!", impact.key)?;
                    }
                }
                Ok(())
            }
            Diagnostic::Testing { resource, file } => {
                write!(f, "\n{}  {}", resource, file.display())
            }
            Diagnostic::FileSkipped { file, message } => {
                write!(f, "  Failed to process {}\n     {}", file.display(), message)
            }
            Diagnostic::Validation { file, issues } => {
                write!(f, "  Validation Err: {}", file.display())?;
                for issue in issues {
                    write!(f, "\n     {}", issue)?;
                }
                Ok(())
            }
            Diagnostic::Unexpected { invariant, verdict } => match verdict {
                Some(verdict) => write!(f, "  {}  {}", invariant, verdict),
                None => write!(f, "  {}", invariant),
            },
            Diagnostic::InvariantFailed { invariant, message } => {
                write!(f, "  {}  {}", invariant, message)
            }
            Diagnostic::DefinitionFailed {
                resource_type,
                message,
            } => write!(f, "  {}: {}", resource_type, message),
            Diagnostic::FixturesSeeded { directory, count } => {
                write!(f, "  seeded {} fixtures in {}", count, directory.display())
            }
        }
    }
}

/// Receives diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Prints every diagnostic to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl DiagnosticSink for ConsoleSink {
    fn emit(&self, diagnostic: Diagnostic) {
        println!("{}", diagnostic);
    }
}

/// Forwards diagnostics to the log, keeping stdout free for reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        if diagnostic.is_problem() {
            warn!("{}", diagnostic.to_string().trim_start());
        } else {
            debug!("{}", diagnostic.to_string().trim_start());
        }
    }
}

/// Keeps diagnostics in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Diagnostic> {
        self.events.lock().clone()
    }

    pub fn problems(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .iter()
            .filter(|d| d.is_problem())
            .cloned()
            .collect()
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.events.lock().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependent_type_rendering() {
        let diagnostic = Diagnostic::DependentType {
            resource_type: "Questionnaire".to_string(),
            element_path: "Questionnaire.item.item".to_string(),
            content_reference: "#Questionnaire.item".to_string(),
            impacts: vec![DependentImpact {
                key: "que-1".to_string(),
                nested: true,
            }],
        };

        let lines: Vec<String> = diagnostic.to_string().lines().map(str::to_string).collect();
        assert_eq!(
            lines,
            [
                "     Dependent Type: Questionnaire Questionnaire.item.item uses path #Questionnaire.item",
                "       impacts que-1",
                "       impacts que-1 nested!",
            ]
        );
    }

    #[test]
    fn test_collecting_sink_separates_problems() {
        let sink = CollectingSink::new();
        sink.emit(Diagnostic::Testing {
            resource: "Foo/1".to_string(),
            file: PathBuf::from("source/foo/foo-example.xml"),
        });
        sink.emit(Diagnostic::FileSkipped {
            file: PathBuf::from("source/foo/foo-broken.xml"),
            message: "invalid xml".to_string(),
        });

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.problems().len(), 1);
    }
}
