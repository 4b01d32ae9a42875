//! The operator registry and the standard operator set.
//!
//! Each operator carries its canonical name, its declared signature, an
//! optional parse override, and a compile function producing the executable
//! node. Adding an operator means adding ONE registration here — the parser,
//! type checker, and compile driver all consume the same definition.

use std::collections::HashMap;

use serde_json::Value as Json;

use crate::ast::{Call, Expression};
use crate::compiler::{CompiledArg, Emitted};
use crate::curve;
use crate::error::CompileError;
use crate::match_op;
use crate::parser::{self, ParsingContext};
use crate::types::{lambda, LambdaType, Type};
use crate::value::Value;
use crate::vm::{Assertion, Coercion, CmpOp, EvalNode, Math1, Math2};

type ParseFn = fn(&Operator, &[Json], &ParsingContext<'_>) -> Result<Expression, CompileError>;
type CompileFn =
    Box<dyn Fn(&Call, &str, Vec<CompiledArg>) -> Result<Emitted, Vec<CompileError>> + Send + Sync>;

/// A single operator definition.
pub struct Operator {
    name: &'static str,
    signature: LambdaType,
    parse_override: Option<ParseFn>,
    compile_fn: CompileFn,
}

impl Operator {
    pub(crate) fn new(
        name: &'static str,
        signature: LambdaType,
        compile: impl Fn(&Call, &str, Vec<CompiledArg>) -> Result<Emitted, Vec<CompileError>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name,
            signature,
            parse_override: None,
            compile_fn: Box::new(compile),
        }
    }

    pub(crate) fn with_parse(
        name: &'static str,
        signature: LambdaType,
        parse: ParseFn,
        compile: impl Fn(&Call, &str, Vec<CompiledArg>) -> Result<Emitted, Vec<CompileError>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name,
            signature,
            parse_override: Some(parse),
            compile_fn: Box::new(compile),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn signature(&self) -> &LambdaType {
        &self.signature
    }

    /// Parse this operator's raw arguments: the override if one is declared,
    /// otherwise the default argument-by-argument flow.
    pub(crate) fn parse(
        &self,
        raw_args: &[Json],
        ctx: &ParsingContext<'_>,
    ) -> Result<Expression, CompileError> {
        match self.parse_override {
            Some(parse) => parse(self, raw_args, ctx),
            None => parser::parse_args_default(self, raw_args, ctx),
        }
    }

    pub(crate) fn compile(
        &self,
        call: &Call,
        key: &str,
        args: Vec<CompiledArg>,
    ) -> Result<Emitted, Vec<CompileError>> {
        (self.compile_fn)(call, key, args)
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// The operator registry: name → definition. Built once, read-only afterwards.
#[derive(Debug)]
pub struct Registry {
    ops: HashMap<&'static str, Operator>,
}

impl Registry {
    pub fn get(&self, name: &str) -> Option<&Operator> {
        self.ops.get(name)
    }

    fn add(&mut self, operator: Operator) {
        self.ops.insert(operator.name, operator);
    }

    #[allow(clippy::too_many_lines)]
    pub fn new() -> Self {
        let mut registry = Self {
            ops: HashMap::new(),
        };

        // Nullary number constants.
        for (name, value) in [
            ("ln2", std::f64::consts::LN_2),
            ("pi", std::f64::consts::PI),
            ("e", std::f64::consts::E),
        ] {
            registry.add(Operator::new(
                name,
                lambda(Type::Number, vec![]),
                move |_, _, _| Ok(Emitted::pure(EvalNode::Const(Value::Number(value)))),
            ));
        }

        // Unary math.
        for (name, op) in [
            ("log10", Math1::Log10),
            ("ln", Math1::Ln),
            ("log2", Math1::Log2),
            ("sin", Math1::Sin),
            ("cos", Math1::Cos),
            ("tan", Math1::Tan),
            ("asin", Math1::Asin),
            ("acos", Math1::Acos),
            ("atan", Math1::Atan),
        ] {
            registry.add(Operator::new(
                name,
                lambda(Type::Number, vec![Type::Number]),
                move |_, _, args| Ok(Emitted::pure(EvalNode::Math1(op, unary(args)))),
            ));
        }

        // Binary math.
        for (name, op) in [
            ("-", Math2::Sub),
            ("/", Math2::Div),
            ("%", Math2::Mod),
            ("^", Math2::Pow),
        ] {
            registry.add(Operator::new(
                name,
                lambda(Type::Number, vec![Type::Number, Type::Number]),
                move |_, _, args| {
                    let (a, b) = binary(args);
                    Ok(Emitted::pure(EvalNode::Math2(op, a, b)))
                },
            ));
        }

        // Associative variadic math.
        registry.add(Operator::new(
            "+",
            lambda(Type::Number, vec![Type::nargs(vec![Type::Number], 2)]),
            |_, _, args| Ok(Emitted::pure(EvalNode::Sum(nodes(args)))),
        ));
        registry.add(Operator::new(
            "*",
            lambda(Type::Number, vec![Type::nargs(vec![Type::Number], 2)]),
            |_, _, args| Ok(Emitted::pure(EvalNode::Product(nodes(args)))),
        ));

        // Comparisons over a common type variable.
        for (name, op) in [
            ("==", CmpOp::Eq),
            ("!=", CmpOp::Ne),
            (">", CmpOp::Gt),
            ("<", CmpOp::Lt),
            (">=", CmpOp::Ge),
            ("<=", CmpOp::Le),
        ] {
            registry.add(Operator::new(
                name,
                lambda(
                    Type::Boolean,
                    vec![Type::Typename("T"), Type::Typename("T")],
                ),
                move |_, _, args| {
                    let (a, b) = binary(args);
                    Ok(Emitted::pure(EvalNode::Compare(op, a, b)))
                },
            ));
        }

        // Boolean connectives, short-circuiting.
        registry.add(Operator::new(
            "&&",
            lambda(Type::Boolean, vec![Type::nargs(vec![Type::Boolean], 2)]),
            |_, _, args| Ok(Emitted::pure(EvalNode::All(nodes(args)))),
        ));
        registry.add(Operator::new(
            "||",
            lambda(Type::Boolean, vec![Type::nargs(vec![Type::Boolean], 2)]),
            |_, _, args| Ok(Emitted::pure(EvalNode::Any(nodes(args)))),
        ));
        registry.add(Operator::new(
            "!",
            lambda(Type::Boolean, vec![Type::Boolean]),
            |_, _, args| Ok(Emitted::pure(EvalNode::Not(unary(args)))),
        ));

        // Strings.
        registry.add(Operator::new(
            "upcase",
            lambda(Type::String, vec![Type::String]),
            |_, _, args| Ok(Emitted::pure(EvalNode::Upcase(unary(args)))),
        ));
        registry.add(Operator::new(
            "downcase",
            lambda(Type::String, vec![Type::String]),
            |_, _, args| Ok(Emitted::pure(EvalNode::Downcase(unary(args)))),
        ));
        registry.add(Operator::new(
            "concat",
            lambda(Type::String, vec![Type::nargs(vec![Type::Value], 2)]),
            |_, _, args| Ok(Emitted::pure(EvalNode::Concat(nodes(args)))),
        ));

        // Type queries, assertions, coercions.
        registry.add(Operator::new(
            "typeOf",
            lambda(Type::String, vec![Type::Value]),
            |_, _, args| Ok(Emitted::pure(EvalNode::TypeOf(unary(args)))),
        ));
        for (name, assertion, result) in [
            ("string", Assertion::String, Type::String),
            ("number", Assertion::Number, Type::Number),
            ("boolean", Assertion::Boolean, Type::Boolean),
            ("object", Assertion::Object, Type::Object),
            ("array", Assertion::Array, Type::array(Type::Value)),
        ] {
            registry.add(Operator::new(
                name,
                lambda(result, vec![Type::Value]),
                move |_, _, args| Ok(Emitted::pure(EvalNode::Assert(assertion, unary(args)))),
            ));
        }
        for (name, coercion, result) in [
            ("to_string", Coercion::ToString, Type::String),
            ("to_number", Coercion::ToNumber, Type::Number),
            ("to_boolean", Coercion::ToBoolean, Type::Boolean),
            ("to_rgba", Coercion::ToRgba, Type::array_n(Type::Number, 4)),
        ] {
            registry.add(Operator::new(
                name,
                lambda(result, vec![Type::Value]),
                move |_, _, args| Ok(Emitted::pure(EvalNode::Coerce(coercion, unary(args)))),
            ));
        }

        // Colors.
        registry.add(Operator::new(
            "parse_color",
            lambda(Type::Color, vec![Type::String]),
            |_, _, args| Ok(Emitted::pure(EvalNode::ParseColor(unary(args)))),
        ));
        registry.add(Operator::new(
            "rgb",
            lambda(Type::Color, vec![Type::Number, Type::Number, Type::Number]),
            |_, _, args| {
                let mut n = nodes(args);
                let b = pop(&mut n);
                let g = pop(&mut n);
                let r = pop(&mut n);
                Ok(Emitted::pure(EvalNode::Rgba {
                    r,
                    g,
                    b,
                    a: Box::new(EvalNode::Const(Value::Number(1.0))),
                }))
            },
        ));
        registry.add(Operator::new(
            "rgba",
            lambda(
                Type::Color,
                vec![Type::Number, Type::Number, Type::Number, Type::Number],
            ),
            |_, _, args| {
                let mut n = nodes(args);
                let a = pop(&mut n);
                let b = pop(&mut n);
                let g = pop(&mut n);
                let r = pop(&mut n);
                Ok(Emitted::pure(EvalNode::Rgba { r, g, b, a }))
            },
        ));

        // Accessors. With one argument `get`/`has` read the implicit feature
        // properties; with two they read the given object and constancy is
        // inherited from it.
        registry.add(Operator::new(
            "get",
            lambda(
                Type::Value,
                vec![Type::String, Type::nargs_between(vec![Type::Object], 0, 1)],
            ),
            |_, _, args| {
                let mut n = nodes(args);
                if n.len() == 1 {
                    Ok(Emitted::feature_dependent(EvalNode::GetProperty(pop(
                        &mut n,
                    ))))
                } else {
                    let object = pop(&mut n);
                    let key = pop(&mut n);
                    Ok(Emitted::pure(EvalNode::GetFrom { key, object }))
                }
            },
        ));
        registry.add(Operator::new(
            "has",
            lambda(
                Type::Boolean,
                vec![Type::String, Type::nargs_between(vec![Type::Object], 0, 1)],
            ),
            |_, _, args| {
                let mut n = nodes(args);
                if n.len() == 1 {
                    Ok(Emitted::feature_dependent(EvalNode::HasProperty(pop(
                        &mut n,
                    ))))
                } else {
                    let object = pop(&mut n);
                    let key = pop(&mut n);
                    Ok(Emitted::pure(EvalNode::HasIn { key, object }))
                }
            },
        ));
        registry.add(Operator::new(
            "at",
            lambda(
                Type::Typename("T"),
                vec![Type::Number, Type::array(Type::Typename("T"))],
            ),
            |_, _, args| {
                let (index, array) = binary(args);
                Ok(Emitted::pure(EvalNode::At { index, array }))
            },
        ));
        registry.add(Operator::new(
            "length",
            lambda(
                Type::Number,
                vec![Type::Variant(vec![Type::array(Type::Value), Type::String])],
            ),
            |_, _, args| Ok(Emitted::pure(EvalNode::Length(unary(args)))),
        ));

        // Feature and map context.
        registry.add(Operator::new(
            "properties",
            lambda(Type::Object, vec![]),
            |_, _, _| Ok(Emitted::feature_dependent(EvalNode::Properties)),
        ));
        registry.add(Operator::new(
            "geometry_type",
            lambda(Type::String, vec![]),
            |_, _, _| Ok(Emitted::feature_dependent(EvalNode::GeometryType)),
        ));
        registry.add(Operator::new(
            "id",
            lambda(Type::Value, vec![]),
            |_, _, _| Ok(Emitted::feature_dependent(EvalNode::Id)),
        ));
        registry.add(Operator::with_parse(
            "zoom",
            lambda(Type::Number, vec![]),
            parse_zoom,
            |_, _, _| Ok(Emitted::zoom_dependent(EvalNode::Zoom)),
        ));

        // Decisions.
        registry.add(Operator::new(
            "case",
            lambda(
                Type::Typename("T"),
                vec![
                    Type::nargs(vec![Type::Boolean, Type::Typename("T")], 1),
                    Type::Typename("T"),
                ],
            ),
            |_, _, args| {
                let mut n = nodes(args);
                let fallback = pop(&mut n);
                let mut branches = Vec::with_capacity(n.len() / 2);
                let mut pairs = n.into_iter();
                while let (Some(condition), Some(output)) = (pairs.next(), pairs.next()) {
                    branches.push((condition, output));
                }
                Ok(Emitted::pure(EvalNode::Case { branches, fallback }))
            },
        ));
        registry.add(Operator::new(
            "coalesce",
            lambda(
                Type::Typename("T"),
                vec![Type::nargs(vec![Type::Typename("T")], 2)],
            ),
            |_, _, args| Ok(Emitted::pure(EvalNode::Coalesce(nodes(args)))),
        ));
        registry.add(curve::operator());
        registry.add(match_op::operator());

        registry
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// `zoom` is only legal as the input slot of a top-level curve, directly or
/// under a root `coalesce`.
fn parse_zoom(
    operator: &Operator,
    raw_args: &[Json],
    ctx: &ParsingContext<'_>,
) -> Result<Expression, CompileError> {
    let in_curve_input = ctx.slot() == Some(2)
        && matches!(ctx.ancestors(), ["curve"] | ["coalesce", "curve"]);
    if !in_curve_input {
        return Err(CompileError::parse(
            "The \"zoom\" expression may only be used as the input to a \
             top-level \"curve\" expression.",
            ctx.key(),
        ));
    }
    parser::parse_args_default(operator, raw_args, ctx)
}

fn nodes(args: Vec<CompiledArg>) -> Vec<EvalNode> {
    args.into_iter().map(|a| a.node).collect()
}

fn pop(nodes: &mut Vec<EvalNode>) -> Box<EvalNode> {
    match nodes.pop() {
        Some(node) => Box::new(node),
        None => unreachable!("arity was checked before compilation"),
    }
}

fn unary(args: Vec<CompiledArg>) -> Box<EvalNode> {
    let mut n = nodes(args);
    pop(&mut n)
}

fn binary(args: Vec<CompiledArg>) -> (Box<EvalNode>, Box<EvalNode>) {
    let mut n = nodes(args);
    let b = pop(&mut n);
    let a = pop(&mut n);
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_the_standard_set() {
        let registry = Registry::new();
        for name in [
            "+", "*", "-", "/", "%", "^", "==", "!=", ">", "<", ">=", "<=", "&&", "||", "!",
            "ln2", "pi", "e", "log10", "ln", "log2", "sin", "cos", "tan", "asin", "acos",
            "atan", "typeOf", "string", "number", "boolean", "object", "array", "to_string",
            "to_number", "to_boolean", "to_rgba", "parse_color", "rgb", "rgba", "get", "has",
            "at", "length", "properties", "geometry_type", "id", "zoom", "case", "match",
            "coalesce", "curve", "upcase", "downcase", "concat",
        ] {
            assert!(registry.get(name).is_some(), "missing operator {name}");
        }
    }

    #[test]
    fn literal_is_a_parser_form_not_an_operator() {
        assert!(Registry::new().get("literal").is_none());
    }

    #[test]
    fn signatures_render_for_diagnostics() {
        let registry = Registry::new();
        let minus = registry.get("-").map(Operator::signature);
        assert_eq!(
            minus.map(ToString::to_string),
            Some("(Number, Number) => Number".to_owned())
        );
    }
}
