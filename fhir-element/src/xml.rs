//! FHIR XML reader.

use crate::errors::{ElementError, ElementResult};
use crate::node::SourceNode;

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Parse a FHIR XML document.
///
/// Primitive values come from the `value` attribute; `id` and `url`
/// attributes become child nodes. XHTML narrative is collapsed to its text.
pub fn parse_xml(text: &str) -> ElementResult<SourceNode> {
    let doc = roxmltree::Document::parse(text).map_err(|e| ElementError::Xml(e.to_string()))?;
    let root = doc.root_element();
    let mut node = convert_element(root);
    if is_resource_name(&node.name) && root.tag_name().namespace() != Some(XHTML_NAMESPACE) {
        node.resource_type = Some(node.name.clone());
    }
    Ok(node)
}

fn convert_element(element: roxmltree::Node<'_, '_>) -> SourceNode {
    let name = element.tag_name().name().to_string();

    if element.tag_name().namespace() == Some(XHTML_NAMESPACE) {
        let text: String = element
            .descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect();
        return SourceNode::with_text(name, text);
    }

    let mut node = SourceNode::new(name);
    node.text = element.attribute("value").map(str::to_string);
    for attr in element.attributes() {
        if attr.name() == "id" || attr.name() == "url" {
            node.children.push(SourceNode::with_text(attr.name(), attr.value()));
        }
    }

    let element_children: Vec<_> = element.children().filter(|c| c.is_element()).collect();

    // <contained><Patient>..</Patient></contained>: lift the resource into
    // the wrapper so navigation stays `contained.id`
    if node.text.is_none() && element_children.len() == 1 {
        let inner = element_children[0];
        let inner_name = inner.tag_name().name();
        if is_resource_name(inner_name) && inner.tag_name().namespace() != Some(XHTML_NAMESPACE) {
            let lifted = convert_element(inner);
            node.resource_type = Some(inner_name.to_string());
            node.children.extend(lifted.children);
            return node;
        }
    }

    node.children
        .extend(element_children.into_iter().map(convert_element));
    node
}

/// Resource names are UpperCamel; element names are lowerCamel.
fn is_resource_name(name: &str) -> bool {
    name.chars().next().map_or(false, |c| c.is_ascii_uppercase())
}
