//! Untyped source tree.

/// One node of a parsed document.
///
/// Primitive values live in `text`; complex values only have `children`.
/// Inline resources (the root, `contained` entries, `Bundle.entry.resource`)
/// carry their resource type in `resource_type` while keeping the element
/// name they appear under, so `contained` stays navigable as `contained`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceNode {
    pub name: String,
    pub text: Option<String>,
    pub resource_type: Option<String>,
    pub children: Vec<SourceNode>,
}

impl SourceNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A minimal resource node carrying only a type and an id.
    pub fn stand_in(resource_type: &str, id: &str) -> Self {
        Self {
            name: resource_type.to_string(),
            text: None,
            resource_type: Some(resource_type.to_string()),
            children: vec![SourceNode::with_text("id", id)],
        }
    }

    /// All children with the given element name, in document order.
    pub fn children<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a SourceNode> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First child with the given element name.
    pub fn child(&self, name: &str) -> Option<&SourceNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Primitive value of the first child with the given name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.text.as_deref())
    }

    pub fn id(&self) -> Option<&str> {
        self.child_text("id")
    }

    /// The resource type for resource nodes, otherwise the element name.
    pub fn type_name(&self) -> &str {
        self.resource_type.as_deref().unwrap_or(&self.name)
    }

    pub fn is_resource(&self) -> bool {
        self.resource_type.is_some()
    }
}
