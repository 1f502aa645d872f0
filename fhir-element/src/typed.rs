//! Typed element trees.

use crate::node::SourceNode;
use std::sync::Arc;

/// Where an element sits inside a structure definition.
///
/// `structure` names the definition that describes the element and `path`
/// is the element path inside it, e.g. (`Questionnaire`, `Questionnaire.item`)
/// or (`HumanName`, `HumanName`) once navigation crosses into a data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementScope {
    pub structure: String,
    pub path: String,
}

impl ElementScope {
    pub fn root(type_name: &str) -> Self {
        Self {
            structure: type_name.to_string(),
            path: type_name.to_string(),
        }
    }
}

/// Summary of a child element: its type and the scope its own children
/// are described in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSummary {
    pub type_name: String,
    pub scope: ElementScope,
}

/// Supplies type metadata while converting a [`SourceNode`] tree.
pub trait SummaryProvider {
    /// Describe the child called `name` of the element at `scope`, or `None`
    /// when the definition does not know it.
    fn child(&self, scope: &ElementScope, name: &str) -> Option<ChildSummary>;
}

/// Provider that knows nothing; every non-resource element stays untyped.
#[derive(Debug, Default, Clone, Copy)]
pub struct UntypedProvider;

impl SummaryProvider for UntypedProvider {
    fn child(&self, _scope: &ElementScope, _name: &str) -> Option<ChildSummary> {
        None
    }
}

/// An element annotated with its type name, as seen by expression evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedElement {
    pub name: String,
    pub type_name: Option<String>,
    pub text: Option<String>,
    pub resource_type: Option<String>,
    pub children: Vec<Arc<TypedElement>>,
}

impl TypedElement {
    /// Convert a source tree, typing elements where `provider` can.
    pub fn from_source(node: &SourceNode, provider: &dyn SummaryProvider) -> Arc<TypedElement> {
        convert(node, None, None, provider)
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Arc<TypedElement>> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.text.as_deref())
    }

    pub fn is_resource(&self) -> bool {
        self.resource_type.is_some()
    }

    /// Whether this element holds a boolean primitive.
    ///
    /// Untyped elements count as boolean when their text is a boolean literal.
    pub fn is_boolean(&self) -> bool {
        match self.type_name.as_deref() {
            Some("boolean") | Some("http://hl7.org/fhirpath/System.Boolean") => true,
            Some(_) => false,
            None => matches!(self.text.as_deref(), Some("true") | Some("false")),
        }
    }
}

fn convert(
    node: &SourceNode,
    scope: Option<ElementScope>,
    type_name: Option<String>,
    provider: &dyn SummaryProvider,
) -> Arc<TypedElement> {
    let (scope, type_name) = match &node.resource_type {
        Some(rt) => (Some(ElementScope::root(rt)), Some(rt.clone())),
        None => (scope, type_name),
    };

    let children = node
        .children
        .iter()
        .map(|child| {
            match scope.as_ref().and_then(|s| provider.child(s, &child.name)) {
                Some(summary) => convert(child, Some(summary.scope), Some(summary.type_name), provider),
                None => convert(child, None, None, provider),
            }
        })
        .collect();

    Arc::new(TypedElement {
        name: node.name.clone(),
        type_name,
        text: node.text.clone(),
        resource_type: node.resource_type.clone(),
        children,
    })
}
