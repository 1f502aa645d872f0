//! Offline reference resolution.
//!
//! Examples are tested in isolation, so references are answered from the
//! document itself: local fragments hit `contained` resources and anything
//! naming a resource type gets a stand-in carrying only its type and id.

use fhir_element::{SourceNode, SummaryProvider, TypedElement};
use fhir_expression::ElementResolver;
use std::sync::Arc;

/// The type, id and version named by a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub resource_type: String,
    pub id: String,
    pub version: Option<String>,
}

impl ResourceIdentity {
    /// Parse `Type/id`, `Type/id/_history/v` or an absolute URL ending in
    /// either form. Anything else (fragments, `urn:` references, bare
    /// types) yields `None`.
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.split(['?', '#']).next()?;
        let segments: Vec<&str> = reference.split('/').filter(|s| !s.is_empty()).collect();

        let (segments, version) = match segments.as_slice() {
            [rest @ .., "_history", version] => (rest, Some(version.to_string())),
            all => (all, None),
        };

        match segments {
            [.., resource_type, id] if is_type_name(resource_type) => Some(Self {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                version,
            }),
            _ => None,
        }
    }
}

fn is_type_name(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next().map_or(false, |c| c.is_ascii_uppercase()) && chars.all(|c| c.is_ascii_alphanumeric())
}

/// Resolves references against one document root without fetching.
pub struct StandInResolver<'a> {
    root: &'a SourceNode,
    provider: &'a dyn SummaryProvider,
}

impl<'a> StandInResolver<'a> {
    pub fn new(root: &'a SourceNode, provider: &'a dyn SummaryProvider) -> Self {
        Self { root, provider }
    }
}

impl ElementResolver for StandInResolver<'_> {
    fn resolve(&self, reference: &str) -> Option<Arc<TypedElement>> {
        if reference.is_empty() {
            return None;
        }

        if let Some(id) = reference.strip_prefix('#') {
            return self
                .root
                .children("contained")
                .find(|c| c.id() == Some(id))
                .map(|c| TypedElement::from_source(c, self.provider));
        }

        let identity = ResourceIdentity::parse(reference)?;
        let stand_in = SourceNode::stand_in(&identity.resource_type, &identity.id);
        Some(TypedElement::from_source(&stand_in, self.provider))
    }
}
