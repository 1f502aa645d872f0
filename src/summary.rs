//! Element typing backed by structure definitions.

use crate::resolver::CanonicalResolver;
use fhir_element::{ChildSummary, ElementScope, SummaryProvider};
use tracing::trace;

const CORE_PREFIX: &str = "http://hl7.org/fhir/StructureDefinition/";

/// Types elements by looking up `http://hl7.org/fhir/StructureDefinition/<Type>`
/// through the canonical resolver.
///
/// Anything the definitions cannot explain stays untyped.
pub struct DefinitionSummaryProvider<'a> {
    resolver: &'a CanonicalResolver,
}

impl<'a> DefinitionSummaryProvider<'a> {
    pub fn new(resolver: &'a CanonicalResolver) -> Self {
        Self { resolver }
    }
}

impl SummaryProvider for DefinitionSummaryProvider<'_> {
    fn child(&self, scope: &ElementScope, name: &str) -> Option<ChildSummary> {
        let uri = format!("{}{}", CORE_PREFIX, scope.structure);
        let definition = match self.resolver.resolve_by_canonical_uri(&uri) {
            Ok(Some(definition)) => definition,
            Ok(None) => return None,
            Err(err) => {
                trace!(%uri, error = %err, "definition unavailable for typing");
                return None;
            }
        };

        let (element, type_name) = definition.child_element(&scope.path, name)?;

        if let Some(target) = element.referenced_path() {
            return Some(ChildSummary {
                type_name: "BackboneElement".to_string(),
                scope: ElementScope {
                    structure: scope.structure.clone(),
                    path: target.to_string(),
                },
            });
        }

        let type_name = type_name?;
        let scope = match type_name.as_str() {
            "BackboneElement" | "Element" => ElementScope {
                structure: scope.structure.clone(),
                path: element.path.clone(),
            },
            other => ElementScope::root(other),
        };
        Some(ChildSummary { type_name, scope })
    }
}
