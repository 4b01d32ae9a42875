//! Parsing of raw JSON into the expression tree.
//!
//! The raw form is an array whose head names an operator and whose tail holds
//! the operand expressions; scalars and `null` are literals, and the
//! `"literal"` form quotes arbitrary arrays and objects. Every node records
//! the dotted path it was parsed from, and the context tracks the operator
//! ancestry so placement-restricted operators (`zoom`) can validate where
//! they appear.

use serde_json::Value as Json;

use crate::ast::{Call, Expression, ExprKind};
use crate::builtins::{Operator, Registry};
use crate::error::CompileError;
use crate::value::Value;

/// Position of the expression currently being parsed: its index path from the
/// root of the raw input and the operator names enclosing it.
#[derive(Debug, Clone)]
pub struct ParsingContext<'a> {
    registry: &'a Registry,
    path: Vec<usize>,
    ancestors: Vec<&'static str>,
}

impl<'a> ParsingContext<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            path: Vec::new(),
            ancestors: Vec::new(),
        }
    }

    /// Dotted key of the current position; the root is `""`.
    pub fn key(&self) -> String {
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Child context for element `index`, without entering an operator.
    pub fn child(&self, index: usize) -> Self {
        let mut path = self.path.clone();
        path.push(index);
        Self {
            registry: self.registry,
            path,
            ancestors: self.ancestors.clone(),
        }
    }

    /// Child context for argument `index` of operator `ancestor`.
    pub fn descend(&self, index: usize, ancestor: &'static str) -> Self {
        let mut derived = self.child(index);
        derived.ancestors.push(ancestor);
        derived
    }

    /// Operator names on the path from the root down to the parent.
    pub fn ancestors(&self) -> &[&'static str] {
        &self.ancestors
    }

    /// The argument slot this expression occupies in its parent call, i.e.
    /// the final index of the path.
    pub fn slot(&self) -> Option<usize> {
        self.path.last().copied()
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }
}

/// Parse a raw value into an expression tree.
pub fn parse(value: &Json, ctx: &ParsingContext<'_>) -> Result<Expression, CompileError> {
    match value {
        Json::Null | Json::Bool(_) | Json::Number(_) | Json::String(_) => {
            Ok(parse_literal(value, ctx))
        }
        Json::Array(elements) => {
            let name = match elements.first() {
                Some(Json::String(name)) => name.as_str(),
                _ => {
                    return Err(CompileError::parse(
                        "Expression name must be a string",
                        ctx.child(0).key(),
                    ))
                }
            };
            if name == "literal" {
                if elements.len() != 2 {
                    return Err(CompileError::parse(
                        format!(
                            "Expected one argument to \"literal\", got {}",
                            elements.len() - 1
                        ),
                        ctx.key(),
                    ));
                }
                return Ok(parse_literal(&elements[1], &ctx.descend(1, "literal")));
            }
            let Some(operator) = ctx.registry.get(name) else {
                return Err(CompileError::parse(
                    format!("Unknown expression \"{name}\""),
                    ctx.child(0).key(),
                ));
            };
            operator.parse(&elements[1..], ctx)
        }
        Json::Object(_) => Err(CompileError::parse("Expected an array", ctx.key())),
    }
}

/// Literal promotion: scalars take their primitive type, arrays infer an item
/// type (uniform primitive kind, else `Value`) plus their length, objects
/// become `Object`.
pub fn parse_literal(value: &Json, ctx: &ParsingContext<'_>) -> Expression {
    Expression::literal(ctx.key(), Value::from_json(value))
}

/// The default parse flow: parse each raw argument under a child context,
/// wrap the sequence in a call carrying the operator's declared signature.
pub(crate) fn parse_args_default(
    operator: &Operator,
    raw_args: &[Json],
    ctx: &ParsingContext<'_>,
) -> Result<Expression, CompileError> {
    let mut args = Vec::with_capacity(raw_args.len());
    for (i, raw) in raw_args.iter().enumerate() {
        args.push(parse(raw, &ctx.descend(i + 1, operator.name()))?);
    }
    Ok(Expression {
        key: ctx.key(),
        kind: ExprKind::Call(Call {
            op: operator.name(),
            signature: operator.signature().clone(),
            args,
            extra: None,
        }),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Type;
    use serde_json::json;

    fn parse_ok(raw: Json) -> Expression {
        let registry = Registry::new();
        parse(&raw, &ParsingContext::new(&registry)).unwrap()
    }

    fn parse_err(raw: Json) -> CompileError {
        let registry = Registry::new();
        parse(&raw, &ParsingContext::new(&registry)).unwrap_err()
    }

    #[test]
    fn scalars_become_literals() {
        let expr = parse_ok(json!(3.5));
        assert_eq!(expr.key, "");
        assert_eq!(*expr.result_type(), Type::Number);

        let expr = parse_ok(json!("hi"));
        assert_eq!(*expr.result_type(), Type::String);

        let expr = parse_ok(json!(null));
        assert_eq!(*expr.result_type(), Type::Null);
    }

    #[test]
    fn bare_object_is_rejected() {
        let err = parse_err(json!({"a": 1}));
        assert_eq!(err.message, "Expected an array");
        assert_eq!(err.key, "");
    }

    #[test]
    fn operator_name_must_be_string() {
        let err = parse_err(json!([1, 2]));
        assert_eq!(err.message, "Expression name must be a string");
        assert_eq!(err.key, "0");
    }

    #[test]
    fn unknown_operator_is_reported_at_the_name() {
        let err = parse_err(json!(["frobnicate", 1]));
        assert_eq!(err.message, "Unknown expression \"frobnicate\"");
        assert_eq!(err.key, "0");
    }

    #[test]
    fn literal_form_quotes_arrays() {
        let expr = parse_ok(json!(["literal", [1, 2, 3]]));
        assert_eq!(*expr.result_type(), Type::array_n(Type::Number, 3));
        match expr.kind {
            ExprKind::Literal { .. } => {}
            ExprKind::Call(_) => panic!("expected a literal node"),
        }
    }

    #[test]
    fn literal_form_quotes_objects() {
        let expr = parse_ok(json!(["literal", {"a": 1}]));
        assert_eq!(*expr.result_type(), Type::Object);
    }

    #[test]
    fn literal_form_requires_one_argument() {
        let err = parse_err(json!(["literal", 1, 2]));
        assert!(err.message.contains("one argument"));
        assert_eq!(err.key, "");
    }

    #[test]
    fn nested_args_get_dotted_keys() {
        let expr = parse_ok(json!(["+", 1, ["*", 2, 3]]));
        match expr.kind {
            ExprKind::Call(call) => {
                assert_eq!(call.args[0].key, "1");
                assert_eq!(call.args[1].key, "2");
                match &call.args[1].kind {
                    ExprKind::Call(inner) => {
                        assert_eq!(inner.args[0].key, "2.1");
                        assert_eq!(inner.args[1].key, "2.2");
                    }
                    ExprKind::Literal { .. } => panic!("expected nested call"),
                }
            }
            ExprKind::Literal { .. } => panic!("expected a call"),
        }
    }

    #[test]
    fn zoom_alone_is_rejected_with_the_placement_message() {
        let err = parse_err(json!(["zoom"]));
        assert_eq!(err.key, "");
        assert_eq!(
            err.message,
            "The \"zoom\" expression may only be used as the input to a top-level \"curve\" expression."
        );
    }

    #[test]
    fn zoom_as_curve_input_is_accepted() {
        parse_ok(json!(["curve", ["linear"], ["zoom"], 0, 1, 10, 2]));
    }

    #[test]
    fn zoom_under_coalesced_curve_is_accepted() {
        parse_ok(json!([
            "coalesce",
            ["curve", ["step"], ["zoom"], 0, 1],
            0
        ]));
    }

    #[test]
    fn zoom_in_a_computed_curve_input_is_rejected() {
        let err = parse_err(json!(["curve", ["linear"], ["+", ["zoom"], 1], 0, 1, 10, 2]));
        assert!(err.message.contains("top-level"));
        assert_eq!(err.key, "2.1");
    }

    #[test]
    fn zoom_in_a_stop_output_is_rejected() {
        let err = parse_err(json!(["curve", ["linear"], 1, 0, ["zoom"], 10, 2]));
        assert!(err.message.contains("top-level"));
    }
}
