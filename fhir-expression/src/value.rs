//! Evaluation values.

use fhir_element::TypedElement;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

/// One item of an evaluation result collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    Element(Arc<TypedElement>),
}

impl Value {
    /// Boolean view: literals, and elements holding a boolean primitive.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Element(e) if e.is_boolean() => match e.text.as_deref() {
                Some("true") => Some(true),
                Some("false") => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Arc<TypedElement>> {
        match self {
            Value::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Text form of a primitive value; `None` for complex elements.
    pub fn primitive_text(&self) -> Option<String> {
        match self {
            Value::Boolean(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Element(e) => e.text.clone(),
        }
    }

    /// Numeric view: number literals, and any value whose text parses as a
    /// decimal number.
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            Value::Boolean(_) => None,
            other => other.primitive_text().and_then(|text| Decimal::from_str(&text).ok()),
        }
    }

    fn is_number_literal(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Decimal(_))
    }

    /// Equality as used by `=` and by union de-duplication.
    pub(crate) fn equivalent(&self, other: &Value) -> bool {
        if self.is_number_literal() || other.is_number_literal() {
            if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
                return a == b;
            }
        }
        match (self, other) {
            (Value::Element(a), Value::Element(b)) if a.text.is_none() || b.text.is_none() => {
                Arc::ptr_eq(a, b) || a == b
            }
            _ => match (self.as_boolean(), other.as_boolean()) {
                (Some(a), Some(b)) => a == b,
                _ => match (self.primitive_text(), other.primitive_text()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            },
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Element(e) => match &e.text {
                Some(text) => write!(f, "{}", text),
                None => write!(f, "{}", e.type_name.as_deref().unwrap_or(&e.name)),
            },
            other => write!(f, "{}", other.primitive_text().unwrap_or_default()),
        }
    }
}
