//! Error types for expression compilation and evaluation.

use thiserror::Error;

/// Errors raised by an [`crate::ExpressionEngine`] or a compiled expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    /// The text could not be compiled.
    #[error("cannot compile `{expression}`: {message}")]
    Compile { expression: String, message: String },

    /// Evaluation failed (type mismatch, singleton violation, bad regex).
    #[error("evaluation failed: {message}")]
    Eval { message: String },
}

impl ExpressionError {
    pub(crate) fn eval(message: impl Into<String>) -> Self {
        ExpressionError::Eval {
            message: message.into(),
        }
    }
}

/// Result type for expression operations.
pub type ExpressionResult<T> = Result<T, ExpressionError>;
