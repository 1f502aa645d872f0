//! Expression evaluation for invariant testing.
//!
//! The harness consumes expressions as a pure function:
//! `compile(text)` yields a [`CompiledExpression`] which is then evaluated
//! against a focus value and an [`EvaluationEnvironment`], producing an
//! ordered collection of [`Value`]s.
//!
//! [`NavigationEngine`] implements the navigation subset of the constraint
//! language that invariant contexts are written in, plus the common boolean
//! functions. Anything outside that subset fails at compile time, so a
//! richer engine can be dropped in behind [`ExpressionEngine`].
//!
//! ## Example
//!
//! ```
//! use fhir_element::{parse_xml, TypedElement, UntypedProvider};
//! use fhir_expression::{EvaluationEnvironment, ExpressionEngine, NavigationEngine, Value};
//!
//! let node = parse_xml(
//!     r#"<Questionnaire xmlns="http://hl7.org/fhir">
//!          <item><linkId value="1"/><item><linkId value="1.1"/></item></item>
//!        </Questionnaire>"#,
//! )
//! .unwrap();
//! let root = TypedElement::from_source(&node, &UntypedProvider);
//! let env = EvaluationEnvironment::new(root.clone());
//!
//! let engine = NavigationEngine::new();
//! let items = engine.compile("Questionnaire.repeat(item)").unwrap();
//! let found = items.evaluate(&Value::Element(root), &env).unwrap();
//! assert_eq!(found.len(), 2);
//! ```

mod errors;
mod eval;
mod lexer;
mod parser;
mod value;

pub use errors::{ExpressionError, ExpressionResult};
pub use eval::NavigationEngine;
pub use value::Value;

use fhir_element::TypedElement;
use std::sync::Arc;

/// Resolves a reference string (`#id`, `Patient/1`, absolute URL) to an element.
pub trait ElementResolver {
    fn resolve(&self, reference: &str) -> Option<Arc<TypedElement>>;
}

/// Evaluation environment bound to one document root.
pub struct EvaluationEnvironment<'a> {
    resource: Arc<TypedElement>,
    resolver: Option<&'a dyn ElementResolver>,
}

impl<'a> EvaluationEnvironment<'a> {
    pub fn new(resource: Arc<TypedElement>) -> Self {
        Self {
            resource,
            resolver: None,
        }
    }

    /// Install the resolver used by `resolve()`.
    pub fn with_resolver(mut self, resolver: &'a dyn ElementResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The document root (`%resource`).
    pub fn resource(&self) -> &Arc<TypedElement> {
        &self.resource
    }

    pub fn resolve(&self, reference: &str) -> Option<Arc<TypedElement>> {
        self.resolver.and_then(|r| r.resolve(reference))
    }
}

/// A compiled expression, reusable across focus values and documents.
pub trait CompiledExpression: Send + Sync {
    fn evaluate(&self, focus: &Value, env: &EvaluationEnvironment<'_>) -> ExpressionResult<Vec<Value>>;
}

/// Compiles expression text.
pub trait ExpressionEngine: Send + Sync {
    fn compile(&self, text: &str) -> ExpressionResult<Arc<dyn CompiledExpression>>;
}
