//! Context remap table.
//!
//! Elements declared with a `contentReference` reuse another element's
//! shape, so an invariant declared on that shape also applies wherever the
//! shape recurs. The table redirects such a context path to an expression
//! that reaches every occurrence.

use serde::{Deserialize, Serialize};

/// One redirect: `path` is replaced by `expression`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapEntry {
    pub path: String,
    pub expression: String,
}

/// Immutable mapping from element path to replacement context expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRemap {
    entries: Vec<RemapEntry>,
}

const BUILT_IN: &[(&str, &str)] = &[
    ("Questionnaire.item", "Questionnaire.repeat(item)"),
    ("QuestionnaireResponse.item", "QuestionnaireResponse.repeat(item)"),
    ("StructureMap.group.rule", "StructureMap.group.repeat(rule)"),
    ("CodeSystem.concept", "CodeSystem.repeat(concept)"),
    ("Composition.section", "Composition.repeat(section)"),
    ("ValueSet.expansion.contains", "ValueSet.expansion.repeat(contains)"),
    ("RequestOrchestration.action", "RequestOrchestration.repeat(action)"),
    ("PlanDefinition.action", "PlanDefinition.repeat(action)"),
    (
        "OperationDefinition.parameter",
        "OperationDefinition.parameter | OperationDefinition.parameter.repeat(part)",
    ),
    (
        "Parameters.parameter",
        "Parameters.parameter | Parameters.parameter.repeat(part)",
    ),
    (
        "ImplementationGuide.definition.page",
        "ImplementationGuide.definition.repeat(page)",
    ),
    // element reused by a sibling element of a different name
    (
        "ValueSet.compose.include",
        "ValueSet.compose.include | ValueSet.compose.exclude",
    ),
    (
        "ValueSet.compose.include.concept.designation",
        "ValueSet.compose.include.concept.designation | ValueSet.expansion.contains.designation",
    ),
    ("Provenance.agent", "Provenance.agent | Provenance.entity.agent"),
    (
        "Observation.referenceRange",
        "Observation.referenceRange | Observation.component.referenceRange",
    ),
    (
        "EvidenceVariable.characteristic",
        "EvidenceVariable.characteristic | EvidenceVariable.characteristic.definitionByCombination.characteristic",
    ),
    (
        "ConceptMap.group.element.target.dependsOn",
        "ConceptMap.group.element.target.dependsOn | ConceptMap.group.element.target.product",
    ),
    (
        "ExampleScenario.instance.containedInstance",
        "ExampleScenario.instance.containedInstance | ExampleScenario.process.step.operation.request | ExampleScenario.process.step.operation.response",
    ),
    (
        "ExampleScenario.process.step",
        "ExampleScenario.process.step | ExampleScenario.process.step.alternative.step",
    ),
    (
        "ExampleScenario.process",
        "ExampleScenario.process | ExampleScenario.process.step.process",
    ),
    (
        "TestScript.setup.action.assert",
        "TestScript.setup.action.assert | TestScript.test.action.assert",
    ),
    (
        "TestScript.setup.action.operation",
        "TestScript.setup.action.operation | TestScript.test.action.operation | TestScript.teardown.action.operation",
    ),
];

impl ContextRemap {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The table for the core specification.
    pub fn built_in() -> Self {
        Self::empty().with_entries(BUILT_IN.iter().map(|(path, expression)| RemapEntry {
            path: path.to_string(),
            expression: expression.to_string(),
        }))
    }

    /// Add entries; an entry for an existing path replaces its expression.
    pub fn with_entries(mut self, entries: impl IntoIterator<Item = RemapEntry>) -> Self {
        for entry in entries {
            match self.entries.iter_mut().find(|e| e.path == entry.path) {
                Some(existing) => existing.expression = entry.expression,
                None => self.entries.push(entry),
            }
        }
        self
    }

    pub fn entries(&self) -> &[RemapEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `path` is redirected exactly.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    /// Resolve the context expression for an element path.
    ///
    /// Exact matches win; otherwise the longest entry whose path is a
    /// dotted prefix of `path` rewrites that prefix as `(<expression>).`.
    pub fn apply(&self, path: &str) -> String {
        if let Some(entry) = self.entries.iter().find(|e| e.path == path) {
            return entry.expression.clone();
        }
        let longest = self
            .entries
            .iter()
            .filter(|e| {
                path.len() > e.path.len()
                    && path.starts_with(e.path.as_str())
                    && path.as_bytes()[e.path.len()] == b'.'
            })
            .max_by_key(|e| e.path.len());
        match longest {
            Some(entry) => format!("({}).{}", entry.expression, &path[entry.path.len() + 1..]),
            None => path.to_string(),
        }
    }
}

impl Default for ContextRemap {
    fn default() -> Self {
        Self::built_in()
    }
}
