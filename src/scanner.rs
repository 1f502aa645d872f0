//! Extracting invariants from structure definition sources.

use crate::diagnostics::{DependentImpact, Diagnostic, DiagnosticSink};
use crate::errors::{HarnessError, HarnessResult};
use crate::loader;
use crate::remap::ContextRemap;
use crate::skeleton::{InvariantSkeleton, StructureDefinitionSkeleton};
use fhir_element::{parse_xml, SourceNode};
use std::path::Path;
use tracing::{debug, info};

/// Skeletons produced by one scan pass.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub skeletons: Vec<StructureDefinitionSkeleton>,
    pub total_invariants: usize,
}

/// Builds skeletons from definition sources.
pub struct Scanner<'a> {
    remap: &'a ContextRemap,
    skip_root_names: &'a [String],
    sink: &'a dyn DiagnosticSink,
}

impl<'a> Scanner<'a> {
    pub fn new(remap: &'a ContextRemap, skip_root_names: &'a [String], sink: &'a dyn DiagnosticSink) -> Self {
        Self {
            remap,
            skip_root_names,
            sink,
        }
    }

    /// Scan every definition source in `publish_dir`.
    ///
    /// Only an unreadable directory is an error; individual files that fail
    /// to read or parse are reported and skipped.
    pub fn scan(&self, publish_dir: &Path) -> HarnessResult<ScanResult> {
        let files = loader::definition_files(publish_dir)?;
        info!(directory = %publish_dir.display(), files = files.len(), "scanning definitions");

        let mut result = ScanResult::default();
        for file in files {
            let skeleton = loader::read_source(&file).and_then(|text| self.scan_definition(&file, &text));
            match skeleton {
                Ok(Some(skeleton)) => {
                    result.total_invariants += skeleton.invariants.len();
                    result.skeletons.push(skeleton);
                }
                Ok(None) => {}
                Err(err) => self.sink.emit(Diagnostic::DefinitionSkipped {
                    path: file.clone(),
                    message: err.to_string(),
                }),
            }
        }

        info!(
            skeletons = result.skeletons.len(),
            invariants = result.total_invariants,
            "scan complete"
        );
        Ok(result)
    }

    /// Build the skeleton for one source. Empty sources and wrapper
    /// documents produce `None`.
    pub fn scan_definition(&self, path: &Path, text: &str) -> HarnessResult<Option<StructureDefinitionSkeleton>> {
        if text.is_empty() {
            return Ok(None);
        }

        let node = parse_xml(text).map_err(|e| HarnessError::parse(path, e))?;
        if self.skip_root_names.iter().any(|n| *n == node.name) {
            debug!(path = %path.display(), root = %node.name, "skipping wrapper document");
            return Ok(None);
        }

        let mut skeleton =
            StructureDefinitionSkeleton::new(path, node.child_text("type").map(str::to_string));
        skeleton.canonical_url = node.child_text("url").map(str::to_string);
        skeleton.is_data_type = node.child_text("kind") == Some("complex-type");
        skeleton.is_profile = node.child_text("derivation") == Some("constraint");

        for element in node.children("differential").flat_map(|d| d.children("element")) {
            self.scan_element(&mut skeleton, element);
        }

        debug!(
            path = %path.display(),
            resource_type = skeleton.type_name(),
            invariants = skeleton.invariants.len(),
            "scanned definition"
        );
        Ok(Some(skeleton))
    }

    fn scan_element(&self, skeleton: &mut StructureDefinitionSkeleton, element: &SourceNode) {
        let element_path = element.child_text("path").unwrap_or_default();

        for constraint in element.children("constraint") {
            let mut invariant = InvariantSkeleton::new(
                constraint.child_text("key").unwrap_or_default(),
                constraint.child_text("severity").unwrap_or_default(),
                self.remap.apply(element_path),
                constraint.child_text("expression").unwrap_or_default(),
            );
            invariant.human = constraint.child_text("human").map(str::to_string);
            skeleton.invariants.push(invariant);
        }

        let content_reference = match element.child_text("contentReference") {
            Some(r) if !r.is_empty() => r,
            _ => return,
        };
        let target = content_reference.strip_prefix('#').unwrap_or(content_reference);
        if skeleton.invariants.is_empty() || self.remap.contains(target) {
            return;
        }

        let impacts = skeleton
            .invariants
            .iter()
            .filter(|inv| inv.context.starts_with(target))
            .map(|inv| DependentImpact {
                key: inv.key.clone(),
                nested: element_path.starts_with(inv.context.as_str()),
            })
            .collect();

        self.sink.emit(Diagnostic::DependentType {
            resource_type: skeleton.type_name().to_string(),
            element_path: element_path.to_string(),
            content_reference: content_reference.to_string(),
            impacts,
        });
    }
}
