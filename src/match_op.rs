//! The `match` operator: constant-time dispatch from a scalar discriminator
//! to an output branch.
//!
//! Shape: `["match", input, label1, out1, label2, out2, ..., default]`.
//! Labels are literal scalars, or literal arrays of scalars as sugar for
//! several labels sharing one output. All labels must share one primitive
//! kind, which also becomes the discriminator's required type.

use std::collections::HashMap;

use serde_json::Value as Json;

use crate::ast::{Call, CallExtra, Expression, ExprKind};
use crate::builtins::Operator;
use crate::compiler::{CompiledArg, Emitted};
use crate::error::CompileError;
use crate::parser::{self, ParsingContext};
use crate::types::{lambda, Type};
use crate::value::Value;
use crate::vm::EvalNode;

/// Hashable form of a branch label; `Num` holds canonicalized `f64` bits so
/// `0` and `-0` collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchKey {
    Boolean(bool),
    Number(u64),
    String(String),
}

impl MatchKey {
    pub fn of(value: &Value) -> Option<MatchKey> {
        match value {
            Value::Boolean(b) => Some(MatchKey::Boolean(*b)),
            Value::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                Some(MatchKey::Number(n.to_bits()))
            }
            Value::String(s) => Some(MatchKey::String(s.clone())),
            _ => None,
        }
    }

    fn label_type(&self) -> Type {
        match self {
            MatchKey::Boolean(_) => Type::Boolean,
            MatchKey::Number(_) => Type::Number,
            MatchKey::String(_) => Type::String,
        }
    }
}

pub(crate) fn operator() -> Operator {
    Operator::with_parse(
        "match",
        // Template only; the parse override rebuilds the signature with the
        // discriminator pinned to the labels' type.
        lambda(
            Type::Typename("T"),
            vec![
                Type::Value,
                Type::nargs(vec![Type::Value, Type::Typename("T")], 1),
                Type::Typename("T"),
            ],
        ),
        parse_match,
        compile_match,
    )
}

fn parse_match(
    operator: &Operator,
    raw_args: &[Json],
    ctx: &ParsingContext<'_>,
) -> Result<Expression, CompileError> {
    if raw_args.len() < 4 {
        return Err(CompileError::parse(
            format!("Expected at least 4 arguments, got {}", raw_args.len()),
            ctx.key(),
        ));
    }
    if raw_args.len() % 2 != 0 {
        return Err(CompileError::parse(
            format!("Expected an even number of arguments, got {}", raw_args.len()),
            ctx.key(),
        ));
    }

    let mut table: HashMap<MatchKey, usize> = HashMap::new();
    let mut label_type: Option<Type> = None;
    let mut args = Vec::with_capacity(raw_args.len());
    for (i, raw) in raw_args.iter().enumerate() {
        let is_label = i >= 1 && i < raw_args.len() - 1 && i % 2 == 1;
        if !is_label {
            args.push(parser::parse(raw, &ctx.descend(i + 1, "match"))?);
            continue;
        }

        // Labels are taken literally, never parsed as operator calls.
        let key = ctx.child(i + 1).key();
        let branch = (i - 1) / 2;
        let scalars: Vec<&Json> = match raw {
            Json::Array(items) if !items.is_empty() => items.iter().collect(),
            Json::Array(_) => {
                return Err(CompileError::parse(
                    "Match label arrays must contain at least one label",
                    key.clone(),
                ));
            }
            other => vec![other],
        };
        for scalar in scalars {
            let value = Value::from_json(scalar);
            let Some(match_key) = MatchKey::of(&value) else {
                return Err(CompileError::parse(
                    "Match labels must be literal strings, numbers, or booleans",
                    key.clone(),
                ));
            };
            match &label_type {
                None => label_type = Some(match_key.label_type()),
                Some(expected) if *expected == match_key.label_type() => {}
                Some(expected) => {
                    return Err(CompileError::parse(
                        format!(
                            "Expected {expected} but found {} instead.",
                            match_key.label_type()
                        ),
                        key.clone(),
                    ));
                }
            }
            let rendered = crate::vm::to_string_value(&value);
            if table.insert(match_key, branch).is_some() {
                return Err(CompileError::parse(
                    format!("Duplicate match label \"{rendered}\""),
                    key.clone(),
                ));
            }
        }
        args.push(Expression::literal(key, Value::from_json(raw)));
    }

    let label_type = label_type.unwrap_or(Type::Value);
    let signature = lambda(
        operator.signature().result.clone(),
        vec![
            label_type,
            Type::nargs(vec![Type::Value, Type::Typename("T")], 1),
            Type::Typename("T"),
        ],
    );
    Ok(Expression {
        key: ctx.key(),
        kind: ExprKind::Call(Call {
            op: "match",
            signature,
            args,
            extra: Some(CallExtra::Match(table)),
        }),
    })
}

fn compile_match(
    call: &Call,
    _key: &str,
    args: Vec<CompiledArg>,
) -> Result<Emitted, Vec<CompileError>> {
    let table = match &call.extra {
        Some(CallExtra::Match(table)) => table.clone(),
        _ => unreachable!("match call without a parsed label table"),
    };
    let mut nodes: Vec<EvalNode> = args.into_iter().map(|a| a.node).collect();
    let fallback = match nodes.pop() {
        Some(node) => node,
        None => unreachable!(),
    };
    let mut nodes = nodes.into_iter();
    let input = match nodes.next() {
        Some(node) => node,
        None => unreachable!(),
    };
    // Remaining nodes alternate label literal, output; keep the outputs.
    let outputs: Vec<EvalNode> = nodes.skip(1).step_by(2).collect();

    Ok(Emitted::pure(EvalNode::Match {
        input: Box::new(input),
        table,
        outputs,
        fallback: Box::new(fallback),
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builtins::Registry;
    use serde_json::json;

    fn parse_src(raw: Json) -> Result<Expression, CompileError> {
        let registry = Registry::new();
        parser::parse(&raw, &ParsingContext::new(&registry))
    }

    #[test]
    fn builds_a_branch_table() {
        let expr = parse_src(json!(["match", ["get", "kind"], "a", 1, "b", 2, 0])).unwrap();
        match expr.kind {
            ExprKind::Call(call) => match call.extra {
                Some(CallExtra::Match(table)) => {
                    assert_eq!(table.len(), 2);
                    assert_eq!(table.get(&MatchKey::String("a".into())), Some(&0));
                    assert_eq!(table.get(&MatchKey::String("b".into())), Some(&1));
                }
                _ => panic!("expected a match table"),
            },
            ExprKind::Literal { .. } => panic!("expected a call"),
        }
    }

    #[test]
    fn label_arrays_share_one_branch() {
        let expr = parse_src(json!(["match", ["get", "kind"], ["a", "b"], 1, "c", 2, 0])).unwrap();
        match expr.kind {
            ExprKind::Call(call) => match call.extra {
                Some(CallExtra::Match(table)) => {
                    assert_eq!(table.get(&MatchKey::String("a".into())), Some(&0));
                    assert_eq!(table.get(&MatchKey::String("b".into())), Some(&0));
                    assert_eq!(table.get(&MatchKey::String("c".into())), Some(&1));
                }
                _ => panic!("expected a match table"),
            },
            ExprKind::Literal { .. } => panic!("expected a call"),
        }
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let err = parse_src(json!(["match", ["get", "kind"], "a", 1, "a", 2, 0])).unwrap_err();
        assert!(err.message.contains("Duplicate match label"));
        assert_eq!(err.key, "4");
    }

    #[test]
    fn duplicate_across_label_array_is_rejected() {
        let err =
            parse_src(json!(["match", ["get", "kind"], ["a", "b"], 1, "b", 2, 0])).unwrap_err();
        assert!(err.message.contains("Duplicate match label"));
    }

    #[test]
    fn mixed_label_types_are_rejected() {
        let err = parse_src(json!(["match", ["get", "kind"], "a", 1, 2, 2, 0])).unwrap_err();
        assert_eq!(err.message, "Expected String but found Number instead.");
        assert_eq!(err.key, "4");
    }

    #[test]
    fn non_scalar_labels_are_rejected() {
        let err =
            parse_src(json!(["match", ["get", "kind"], [["a"]], 1, 0])).unwrap_err();
        assert!(err.message.contains("literal strings, numbers, or booleans"));
    }

    #[test]
    fn arity_is_validated_at_parse_time() {
        let err = parse_src(json!(["match", ["get", "kind"], "a", 1])).unwrap_err();
        assert!(err.message.starts_with("Expected at least 4"));
        let err = parse_src(json!(["match", ["get", "kind"], "a", 1, "b", 0])).unwrap_err();
        assert!(err.message.starts_with("Expected an even number"));
    }

    #[test]
    fn a_single_pair_plus_default_is_the_minimal_form() {
        assert!(parse_src(json!(["match", ["get", "kind"], "a", 1, 0])).is_ok());
    }

    #[test]
    fn zero_and_negative_zero_labels_collide() {
        let err =
            parse_src(json!(["match", ["get", "n"], 0, 1, -0.0, 2, 0])).unwrap_err();
        assert!(err.message.contains("Duplicate match label"));
    }

    #[test]
    fn discriminator_type_is_pinned_to_the_labels() {
        let expr = parse_src(json!(["match", ["get", "kind"], "a", 1, 0])).unwrap();
        match expr.kind {
            ExprKind::Call(call) => {
                assert_eq!(call.signature.params[0], Type::String);
            }
            ExprKind::Literal { .. } => panic!("expected a call"),
        }
    }
}
