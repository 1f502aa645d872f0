//! Error types for the invariant harness.
//!
//! Only [`HarnessError::Usage`] is fatal; every other variant is scoped to
//! one file, one invariant or one definition and is reported as a
//! diagnostic while processing continues.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while scanning, resolving or testing.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A definition, example or fixture is malformed.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// An invariant or context expression does not compile.
    #[error("cannot compile `{expression}`: {message}")]
    ExpressionCompile { expression: String, message: String },

    /// An invariant or context expression failed while evaluating.
    #[error("evaluating `{expression}` failed: {message}")]
    ExpressionEval { expression: String, message: String },

    /// Resolution by anything other than a canonical URL.
    #[error("resolution by non-canonical uri is not supported: {uri}")]
    UnsupportedResolution { uri: String },

    /// The configuration file is malformed.
    #[error("invalid configuration {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// The filesystem watcher could not be started.
    #[error("file watcher failed: {0}")]
    Watch(String),

    /// Invocation-time misconfiguration.
    #[error("usage: {0}")]
    Usage(String),
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        HarnessError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Attach the expression text to an engine error.
    pub(crate) fn expression(expression: &str, error: fhir_expression::ExpressionError) -> Self {
        match error {
            fhir_expression::ExpressionError::Compile { message, .. } => {
                HarnessError::ExpressionCompile {
                    expression: expression.to_string(),
                    message,
                }
            }
            fhir_expression::ExpressionError::Eval { message } => HarnessError::ExpressionEval {
                expression: expression.to_string(),
                message,
            },
        }
    }
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;
