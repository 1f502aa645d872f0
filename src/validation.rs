//! Structural validator seam.
//!
//! Validation runs with constraint checking disabled; its residual issues
//! are reported for information and never counted against invariants.

use fhir_element::TypedElement;
use fhir_expression::ElementResolver;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Invalid,
    Structure,
    Required,
    Value,
    Incomplete,
    Informational,
    Exception,
    CodeInvalid,
    NotFound,
}

/// One validator finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub code: IssueType,
    pub text: Option<String>,
    /// Validator-specific detail codes.
    pub coding: Vec<String>,
}

impl Issue {
    pub fn new(severity: IssueSeverity, code: IssueType, text: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            text: Some(text.into()),
            coding: Vec::new(),
        }
    }

    pub fn with_coding(mut self, code: impl Into<String>) -> Self {
        self.coding.push(code.into());
        self
    }

    fn has_coding(&self, code: &str) -> bool {
        self.coding.iter().any(|c| c == code)
    }

    /// Issues that isolated examples always produce.
    pub fn is_noise(&self) -> bool {
        use IssueSeverity::*;
        match (self.severity, self.code) {
            (Warning | Information, _) => true,
            (Error, IssueType::Informational) => true,
            (Error, IssueType::Invalid)
                if self
                    .text
                    .as_deref()
                    .map_or(false, |t| t.contains("which is not a known FHIR core type")) =>
            {
                true
            }
            (Error, IssueType::Incomplete) if self.has_coding("4000") => true,
            (Error, IssueType::Invalid) if self.has_coding("1003") => true,
            (Fatal, _) if self.has_coding("5003") => true,
            _ => false,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.severity, self.code)?;
        if let Some(text) = &self.text {
            write!(f, ": {}", text)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub issues: Vec<Issue>,
}

impl ValidationOutcome {
    /// Drop noise categories, keeping everything else.
    pub fn filtered(mut self) -> Self {
        self.issues.retain(|i| !i.is_noise());
        self
    }

    pub fn success(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| matches!(i.severity, IssueSeverity::Fatal | IssueSeverity::Error))
    }
}

/// Terminology lookups made during validation.
pub trait TerminologyService: Send + Sync {
    fn validate_code(&self, value_set: &str, system: Option<&str>, code: &str) -> bool;
}

/// Reports every code as valid.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllTerminology;

impl TerminologyService for AcceptAllTerminology {
    fn validate_code(&self, _value_set: &str, _system: Option<&str>, _code: &str) -> bool {
        true
    }
}

/// Structural validation of a typed document.
pub trait InstanceValidator: Send + Sync {
    fn validate(
        &self,
        root: &TypedElement,
        resolver: &dyn ElementResolver,
        terminology: &dyn TerminologyService,
    ) -> ValidationOutcome;
}
