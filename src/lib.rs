//! Conformance harness for the invariants declared in a FHIR specification
//! source tree.
//!
//! Structure definitions under `publish/` declare named boolean invariants
//! scoped to element contexts. The harness extracts them, evaluates each
//! one against the examples and targeted fixtures under `source/`, and
//! keeps per-invariant success/fail/error tallies that are re-computed
//! whenever a tested file changes.
//!
//! ## Modules
//!
//! - [`remap`] - Context redirects for elements that reuse another element's shape
//! - [`scanner`] - Builds [`StructureDefinitionSkeleton`]s from definition sources
//! - [`resolver`] - Canonical URL lookup with lazy parsing
//! - [`summary`] - Definition-driven element typing
//! - [`references`] - Offline reference resolution
//! - [`harness`] - Per-file evaluation and classification
//! - [`session`] - Scan pass, bulk pass and file ownership
//! - [`report`] - Result rows in text and JSON
//! - [`monitor`] - Debounced re-testing on file changes
//! - [`diagnostics`] - Structured events emitted along the way
//! - [`validation`] - Structural validator seam
//! - [`config`] - TOML configuration
//! - [`errors`] - Error types

pub mod config;
pub mod definition;
pub mod diagnostics;
pub mod errors;
pub mod fixture;
pub mod harness;
pub mod loader;
pub mod logging;
pub mod monitor;
pub mod references;
pub mod remap;
pub mod report;
pub mod resolver;
pub mod scanner;
pub mod session;
pub mod skeleton;
pub mod summary;
pub mod validation;

pub use config::HarnessConfig;
pub use definition::{Constraint, ElementDefinition, StructureDefinition};
pub use diagnostics::{CollectingSink, ConsoleSink, Diagnostic, DiagnosticSink, TracingSink};
pub use errors::{HarnessError, HarnessResult};
pub use harness::{classify, Harness, Mode, Verdict};
pub use monitor::{Debouncer, Monitor, MonitorState};
pub use references::{ResourceIdentity, StandInResolver};
pub use remap::{ContextRemap, RemapEntry};
pub use report::ReportRow;
pub use resolver::{CanonicalResolver, SourceReader};
pub use scanner::{ScanResult, Scanner};
pub use session::Session;
pub use skeleton::{InvariantSkeleton, Outcome, Severity, SkeletonId, StructureDefinitionSkeleton, Tally};
pub use summary::DefinitionSummaryProvider;
pub use validation::{AcceptAllTerminology, InstanceValidator, Issue, ValidationOutcome};

#[cfg(test)]
mod tests;
