//! Error types for document parsing.

use thiserror::Error;

/// Errors raised while turning serialized text into a [`crate::SourceNode`] tree.
#[derive(Debug, Error)]
pub enum ElementError {
    /// The text is not well-formed XML.
    #[error("invalid xml: {0}")]
    Xml(String),

    /// The text is not well-formed JSON.
    #[error("invalid json: {0}")]
    Json(String),

    /// The text parsed but does not have the shape of a FHIR document.
    #[error("unexpected document structure: {0}")]
    Structure(String),
}

/// Result type for element operations.
pub type ElementResult<T> = Result<T, ElementError>;
