//! Tree-walking evaluator for the navigation subset.

use crate::errors::{ExpressionError, ExpressionResult};
use crate::parser::{parse, BinaryOp, EnvVar, Expr, Function};
use crate::value::Value;
use crate::{CompiledExpression, EvaluationEnvironment, ExpressionEngine};
use fhir_element::TypedElement;
use std::sync::Arc;

/// Engine for path navigation, unions, `repeat()` and the core boolean
/// functions invariant constraints lean on.
#[derive(Debug, Default, Clone, Copy)]
pub struct NavigationEngine;

impl NavigationEngine {
    pub fn new() -> Self {
        NavigationEngine
    }
}

impl ExpressionEngine for NavigationEngine {
    fn compile(&self, text: &str) -> ExpressionResult<Arc<dyn CompiledExpression>> {
        let expr = parse(text)?;
        Ok(Arc::new(Compiled { expr }))
    }
}

struct Compiled {
    expr: Expr,
}

impl CompiledExpression for Compiled {
    fn evaluate(&self, focus: &Value, env: &EvaluationEnvironment<'_>) -> ExpressionResult<Vec<Value>> {
        let scope = Scope { env, context: focus };
        scope.eval(&self.expr, std::slice::from_ref(focus), focus)
    }
}

struct Scope<'e, 'a> {
    env: &'e EvaluationEnvironment<'a>,
    context: &'e Value,
}

impl Scope<'_, '_> {
    /// Evaluate `expr` with `input` as the implicit focus collection.
    fn eval(&self, expr: &Expr, input: &[Value], this: &Value) -> ExpressionResult<Vec<Value>> {
        match expr {
            Expr::Boolean(b) => Ok(vec![Value::Boolean(*b)]),
            Expr::Str(s) => Ok(vec![Value::String(s.clone())]),
            Expr::Integer(i) => Ok(vec![Value::Integer(*i)]),
            Expr::Decimal(d) => Ok(vec![Value::Decimal(*d)]),
            Expr::This => Ok(vec![this.clone()]),
            Expr::EnvVar(EnvVar::Resource) => Ok(vec![Value::Element(self.env.resource().clone())]),
            Expr::EnvVar(EnvVar::Context) => Ok(vec![self.context.clone()]),
            Expr::Member { target: None, name } => {
                // a leading type name selects the focus itself
                let typed: Vec<Value> = input
                    .iter()
                    .filter(|v| is_of_type(v, name))
                    .cloned()
                    .collect();
                if !typed.is_empty() {
                    return Ok(typed);
                }
                Ok(navigate(input, name))
            }
            Expr::Member {
                target: Some(target),
                name,
            } => {
                let items = self.eval(target, input, this)?;
                Ok(navigate(&items, name))
            }
            Expr::Index { target, index } => {
                let items = self.eval(target, input, this)?;
                let index = self.eval(index, input, this)?;
                match index.as_slice() {
                    [Value::Integer(i)] if *i >= 0 => {
                        Ok(items.into_iter().nth(*i as usize).into_iter().collect())
                    }
                    _ => Err(ExpressionError::eval("indexer requires a single non-negative integer")),
                }
            }
            Expr::Function {
                target,
                function,
                args,
            } => {
                let items = match target {
                    Some(target) => self.eval(target, input, this)?,
                    None => input.to_vec(),
                };
                self.call(*function, items, args)
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs, input, this)?;
                let right = self.eval(rhs, input, this)?;
                binary(*op, left, right)
            }
        }
    }

    /// Evaluate a lambda argument against one item.
    fn eval_for(&self, expr: &Expr, item: &Value) -> ExpressionResult<Vec<Value>> {
        self.eval(expr, std::slice::from_ref(item), item)
    }

    fn call(&self, function: Function, items: Vec<Value>, args: &[Expr]) -> ExpressionResult<Vec<Value>> {
        match function {
            Function::Exists => match args.first() {
                None => Ok(boolean(!items.is_empty())),
                Some(criteria) => {
                    for item in &items {
                        if to_boolean(&self.eval_for(criteria, item)?)? == Some(true) {
                            return Ok(boolean(true));
                        }
                    }
                    Ok(boolean(false))
                }
            },
            Function::Empty => Ok(boolean(items.is_empty())),
            Function::Not => Ok(to_boolean(&items)?.map(|b| Value::Boolean(!b)).into_iter().collect()),
            Function::Count => Ok(vec![Value::Integer(items.len() as i64)]),
            Function::First => Ok(items.into_iter().next().into_iter().collect()),
            Function::HasValue => Ok(boolean(matches!(
                items.as_slice(),
                [item] if item.primitive_text().is_some()
            ))),
            Function::Where => {
                let mut kept = Vec::new();
                for item in items {
                    if to_boolean(&self.eval_for(&args[0], &item)?)? == Some(true) {
                        kept.push(item);
                    }
                }
                Ok(kept)
            }
            Function::All => {
                for item in &items {
                    if to_boolean(&self.eval_for(&args[0], item)?)? != Some(true) {
                        return Ok(boolean(false));
                    }
                }
                Ok(boolean(true))
            }
            Function::Select => {
                let mut projected = Vec::new();
                for item in &items {
                    projected.extend(self.eval_for(&args[0], item)?);
                }
                Ok(projected)
            }
            Function::Repeat => {
                let mut result: Vec<Value> = Vec::new();
                let mut queue = items;
                while !queue.is_empty() {
                    let mut next = Vec::new();
                    for item in &queue {
                        for found in self.eval_for(&args[0], item)? {
                            if !result.iter().any(|r| same_item(r, &found)) {
                                result.push(found.clone());
                                next.push(found);
                            }
                        }
                    }
                    queue = next;
                }
                Ok(result)
            }
            Function::Resolve => Ok(items
                .iter()
                .filter_map(reference_text)
                .filter_map(|reference| self.env.resolve(&reference))
                .map(Value::Element)
                .collect()),
            Function::Matches => {
                let Some(text) = singleton_text(&items)? else {
                    return Ok(Vec::new());
                };
                let Some(pattern) = singleton_text(&self.eval_for(&args[0], self.context)?)? else {
                    return Ok(Vec::new());
                };
                let regex = regex::Regex::new(&pattern)
                    .map_err(|e| ExpressionError::eval(format!("invalid regex `{}`: {}", pattern, e)))?;
                Ok(boolean(regex.is_match(&text)))
            }
            Function::StartsWith => {
                let Some(text) = singleton_text(&items)? else {
                    return Ok(Vec::new());
                };
                let Some(prefix) = singleton_text(&self.eval_for(&args[0], self.context)?)? else {
                    return Ok(Vec::new());
                };
                Ok(boolean(text.starts_with(&prefix)))
            }
            Function::Length => Ok(singleton_text(&items)?
                .map(|text| Value::Integer(text.chars().count() as i64))
                .into_iter()
                .collect()),
        }
    }
}

fn boolean(b: bool) -> Vec<Value> {
    vec![Value::Boolean(b)]
}

fn is_of_type(value: &Value, name: &str) -> bool {
    match value {
        Value::Element(e) => e.resource_type.as_deref() == Some(name),
        _ => false,
    }
}

/// Child navigation; `value` also matches choice renderings like `valueQuantity`.
fn navigate(items: &[Value], name: &str) -> Vec<Value> {
    let mut out = Vec::new();
    for element in items.iter().filter_map(Value::as_element) {
        let exact: Vec<&Arc<TypedElement>> = element.children_named(name).collect();
        if !exact.is_empty() {
            out.extend(exact.into_iter().cloned().map(Value::Element));
            continue;
        }
        out.extend(
            element
                .children
                .iter()
                .filter(|c| is_choice_of(&c.name, name))
                .cloned()
                .map(Value::Element),
        );
    }
    out
}

/// Type suffixes a choice element (`value[x]`) can be rendered with.
const CHOICE_TYPES: &[&str] = &[
    "Base64Binary", "Boolean", "Canonical", "Code", "Date", "DateTime", "Decimal", "Id",
    "Instant", "Integer", "Integer64", "Markdown", "Oid", "PositiveInt", "String", "Time",
    "UnsignedInt", "Uri", "Url", "Uuid", "Address", "Age", "Annotation", "Attachment",
    "CodeableConcept", "CodeableReference", "Coding", "ContactPoint", "Count", "Distance",
    "Duration", "HumanName", "Identifier", "Money", "Period", "Quantity", "Range", "Ratio",
    "RatioRange", "Reference", "SampledData", "Signature", "Timing", "ContactDetail",
    "DataRequirement", "Expression", "ParameterDefinition", "RelatedArtifact",
    "TriggerDefinition", "UsageContext", "Availability", "ExtendedContactDetail", "Dosage",
    "Meta",
];

fn is_choice_of(child: &str, base: &str) -> bool {
    child
        .strip_prefix(base)
        .map_or(false, |suffix| CHOICE_TYPES.contains(&suffix))
}

fn same_item(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Element(x), Value::Element(y)) => Arc::ptr_eq(x, y),
        _ => a == b,
    }
}

fn reference_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Element(e) => e
            .child_text("reference")
            .map(str::to_string)
            .or_else(|| e.text.clone()),
        _ => None,
    }
}

fn singleton_text(items: &[Value]) -> ExpressionResult<Option<String>> {
    Ok(singleton(items)?.and_then(Value::primitive_text))
}

fn singleton(items: &[Value]) -> ExpressionResult<Option<&Value>> {
    match items {
        [] => Ok(None),
        [item] => Ok(Some(item)),
        _ => Err(ExpressionError::eval("expected a single value, got a collection")),
    }
}

/// Singleton evaluation of a collection in boolean position.
fn to_boolean(items: &[Value]) -> ExpressionResult<Option<bool>> {
    match items {
        [] => Ok(None),
        [item] => Ok(Some(item.as_boolean().unwrap_or(true))),
        _ => Err(ExpressionError::eval(format!(
            "expected a single boolean, got {} values",
            items.len()
        ))),
    }
}

fn binary(op: BinaryOp, left: Vec<Value>, right: Vec<Value>) -> ExpressionResult<Vec<Value>> {
    let result = match op {
        BinaryOp::Union => {
            let mut merged: Vec<Value> = Vec::new();
            for item in left.into_iter().chain(right) {
                if !merged.iter().any(|m| same_item(m, &item)) {
                    merged.push(item);
                }
            }
            return Ok(merged);
        }
        BinaryOp::Eq | BinaryOp::NotEq => {
            if left.is_empty() || right.is_empty() {
                return Ok(Vec::new());
            }
            let equal = left.len() == right.len()
                && left.iter().zip(&right).all(|(a, b)| a.equivalent(b));
            Some(if op == BinaryOp::Eq { equal } else { !equal })
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let (Some(a), Some(b)) = (singleton(&left)?, singleton(&right)?) else {
                return Ok(Vec::new());
            };
            // numbers compare by value, other primitives by their text
            let ordering = match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => match (a.primitive_text(), b.primitive_text()) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    _ => return Ok(Vec::new()),
                },
            };
            Some(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        BinaryOp::And => match (to_boolean(&left)?, to_boolean(&right)?) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BinaryOp::Or => match (to_boolean(&left)?, to_boolean(&right)?) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        BinaryOp::Xor => match (to_boolean(&left)?, to_boolean(&right)?) {
            (Some(a), Some(b)) => Some(a != b),
            _ => None,
        },
        BinaryOp::Implies => match (to_boolean(&left)?, to_boolean(&right)?) {
            (Some(false), _) | (_, Some(true)) => Some(true),
            (Some(true), Some(false)) => Some(false),
            _ => None,
        },
    };
    Ok(result.map(Value::Boolean).into_iter().collect())
}
