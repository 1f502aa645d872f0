//! Full structure definition model, built on demand by the canonical resolver.

use crate::errors::{HarnessError, HarnessResult};
use fhir_element::{parse_xml, SourceNode};
use std::path::Path;

/// A declared constraint on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub key: String,
    pub severity: String,
    pub human: Option<String>,
    pub expression: Option<String>,
}

/// One element of a snapshot or differential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDefinition {
    pub path: String,
    /// Type codes, in declaration order.
    pub types: Vec<String>,
    /// `#Path.to.element` when the element reuses another element's shape.
    pub content_reference: Option<String>,
    pub min: Option<u32>,
    pub max: Option<String>,
    pub constraints: Vec<Constraint>,
}

impl ElementDefinition {
    fn from_source(node: &SourceNode) -> HarnessResult<Self> {
        let path = node
            .child_text("path")
            .ok_or_else(|| HarnessError::Parse {
                path: Default::default(),
                message: "element without a path".to_string(),
            })?
            .to_string();

        Ok(Self {
            path,
            types: node
                .children("type")
                .filter_map(|t| t.child_text("code"))
                .map(str::to_string)
                .collect(),
            content_reference: node.child_text("contentReference").map(str::to_string),
            min: node.child_text("min").and_then(|m| m.parse().ok()),
            max: node.child_text("max").map(str::to_string),
            constraints: node
                .children("constraint")
                .map(|c| Constraint {
                    key: c.child_text("key").unwrap_or_default().to_string(),
                    severity: c.child_text("severity").unwrap_or_default().to_string(),
                    human: c.child_text("human").map(str::to_string),
                    expression: c.child_text("expression").map(str::to_string),
                })
                .collect(),
        })
    }

    /// The last path segment, e.g. `value[x]` for `Observation.value[x]`.
    pub fn name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    pub fn is_choice(&self) -> bool {
        self.path.ends_with("[x]")
    }

    /// The referenced element path without its leading `#`.
    pub fn referenced_path(&self) -> Option<&str> {
        self.content_reference
            .as_deref()
            .map(|r| r.strip_prefix('#').unwrap_or(r))
    }
}

/// A parsed structure definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureDefinition {
    pub url: Option<String>,
    pub name: Option<String>,
    pub type_name: Option<String>,
    pub kind: Option<String>,
    pub derivation: Option<String>,
    pub base_definition: Option<String>,
    pub snapshot: Vec<ElementDefinition>,
    pub differential: Vec<ElementDefinition>,
}

impl StructureDefinition {
    /// Parse a definition from its XML source.
    pub fn parse(path: &Path, text: &str) -> HarnessResult<Self> {
        let node = parse_xml(text).map_err(|e| HarnessError::parse(path, e))?;
        Self::from_source(&node).map_err(|e| match e {
            HarnessError::Parse { message, .. } => HarnessError::parse(path, message),
            other => other,
        })
    }

    pub fn from_source(node: &SourceNode) -> HarnessResult<Self> {
        if node.name != "StructureDefinition" {
            return Err(HarnessError::Parse {
                path: Default::default(),
                message: format!("expected StructureDefinition, found {}", node.name),
            });
        }

        let elements = |section: &str| -> HarnessResult<Vec<ElementDefinition>> {
            node.children(section)
                .flat_map(|s| s.children("element"))
                .map(ElementDefinition::from_source)
                .collect()
        };

        Ok(Self {
            url: node.child_text("url").map(str::to_string),
            name: node.child_text("name").map(str::to_string),
            type_name: node.child_text("type").map(str::to_string),
            kind: node.child_text("kind").map(str::to_string),
            derivation: node.child_text("derivation").map(str::to_string),
            base_definition: node.child_text("baseDefinition").map(str::to_string),
            snapshot: elements("snapshot")?,
            differential: elements("differential")?,
        })
    }

    /// Snapshot elements when present, otherwise the differential.
    pub fn elements(&self) -> &[ElementDefinition] {
        if self.snapshot.is_empty() {
            &self.differential
        } else {
            &self.snapshot
        }
    }

    pub fn element(&self, path: &str) -> Option<&ElementDefinition> {
        self.elements().iter().find(|e| e.path == path)
    }

    /// Find the child `name` of the element at `parent`, returning the
    /// element and the type it takes in this instance.
    ///
    /// Choice elements match by type suffix: `valueString` under
    /// `Observation` resolves `Observation.value[x]` as `string`.
    pub fn child_element(&self, parent: &str, name: &str) -> Option<(&ElementDefinition, Option<String>)> {
        let direct = format!("{}.{}", parent, name);
        if let Some(element) = self.element(&direct) {
            return Some((element, element.types.first().cloned()));
        }

        self.elements()
            .iter()
            .filter(|e| e.is_choice())
            .filter(|e| e.path.len() > parent.len() && e.path.starts_with(parent))
            .filter(|e| e.path.as_bytes()[parent.len()] == b'.')
            .find_map(|e| {
                let base = e.name().trim_end_matches("[x]");
                let suffix = name.strip_prefix(base)?;
                e.types
                    .iter()
                    .find(|t| capitalize(t) == suffix)
                    .map(|t| (e, Some(t.clone())))
            })
    }

    pub fn is_data_type(&self) -> bool {
        self.kind.as_deref() == Some("complex-type")
    }

    pub fn is_profile(&self) -> bool {
        self.derivation.as_deref() == Some("constraint")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
