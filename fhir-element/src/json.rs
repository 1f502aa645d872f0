//! FHIR JSON reader.

use crate::errors::{ElementError, ElementResult};
use crate::node::SourceNode;
use serde_json::{Map, Value};

static NULL: Value = Value::Null;

/// Parse a FHIR JSON document.
///
/// Arrays expand into repeated children of the same name, and the `_name`
/// shadow properties that carry ids/extensions of primitives are merged into
/// the primitive's node.
pub fn parse_json(text: &str) -> ElementResult<SourceNode> {
    let value: Value = serde_json::from_str(text).map_err(|e| ElementError::Json(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ElementError::Structure("document root is not a JSON object".to_string()))?;
    let resource_type = object
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| ElementError::Structure("document root has no resourceType".to_string()))?;

    let mut root = SourceNode::new(resource_type);
    root.resource_type = Some(resource_type.to_string());
    root.children = convert_members(object);
    Ok(root)
}

fn convert_members(object: &Map<String, Value>) -> Vec<SourceNode> {
    let mut children = Vec::new();

    for (key, value) in object {
        if key == "resourceType" || key == "fhir_comments" {
            continue;
        }
        let name = match key.strip_prefix('_') {
            // shadow without a value alongside it
            Some(base) if !object.contains_key(base) => base,
            Some(_) => continue,
            None => key.as_str(),
        };
        let (value, shadow) = if name == key {
            (value, object.get(&format!("_{}", key)))
        } else {
            (&NULL, Some(value))
        };

        match value {
            Value::Array(items) => {
                let shadows = shadow.and_then(Value::as_array);
                for (idx, item) in items.iter().enumerate() {
                    let item_shadow = shadows.and_then(|s| s.get(idx));
                    children.extend(convert_value(name, item, item_shadow));
                }
            }
            Value::Null => match shadow {
                Some(Value::Array(shadows)) => {
                    for item_shadow in shadows {
                        children.extend(convert_value(name, &NULL, Some(item_shadow)));
                    }
                }
                other => children.extend(convert_value(name, &NULL, other)),
            },
            _ => children.extend(convert_value(name, value, shadow)),
        }
    }

    children
}

fn convert_value(name: &str, value: &Value, shadow: Option<&Value>) -> Option<SourceNode> {
    let mut node = SourceNode::new(name);
    match value {
        Value::Null | Value::Array(_) => {}
        Value::Bool(b) => node.text = Some(b.to_string()),
        Value::Number(n) => node.text = Some(n.to_string()),
        Value::String(s) => node.text = Some(s.clone()),
        Value::Object(map) => {
            node.resource_type = map
                .get("resourceType")
                .and_then(Value::as_str)
                .map(str::to_string);
            node.children = convert_members(map);
        }
    }
    if let Some(Value::Object(extra)) = shadow {
        node.children.extend(convert_members(extra));
    }
    if node.text.is_none() && node.children.is_empty() && node.resource_type.is_none() {
        return None;
    }
    Some(node)
}
