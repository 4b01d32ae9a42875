//! The `curve` operator: a numeric input mapped through (input, output)
//! stops under a named interpolation mode.
//!
//! Shape: `["curve", interpolation, input, stopIn1, stopOut1, ...]`. Stop
//! inputs must be literal numbers in strictly ascending order; stop outputs
//! may be arbitrary expressions and only the selected neighbors are evaluated.

use serde_json::Value as Json;

use crate::ast::{Call, CallExtra, Expression, ExprKind};
use crate::builtins::Operator;
use crate::compiler::{CompiledArg, Emitted};
use crate::error::{CompileError, EvalError};
use crate::parser::{self, ParsingContext};
use crate::types::{lambda, Type};
use crate::value::Value;
use crate::vm::{self, EvalContext, EvalNode};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interpolation {
    Step,
    Linear,
    Exponential { base: f64 },
}

/// What the curve produces, fixed at compile time from the first stop
/// output's type. `Stepped` covers every other output type, legal only under
/// step interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Number,
    Color,
    NumberArray,
    Stepped,
}

pub(crate) fn operator() -> Operator {
    Operator::with_parse(
        "curve",
        lambda(
            Type::Typename("T"),
            vec![
                Type::Value,
                Type::Number,
                Type::nargs(vec![Type::Number, Type::Typename("T")], 1),
            ],
        ),
        parse_curve,
        compile_curve,
    )
}

/// Parse override: consume the interpolation spec, substitute a placeholder
/// literal in its slot so the remaining arguments keep their source indices,
/// and attach the interpolation to the call.
fn parse_curve(
    operator: &Operator,
    raw_args: &[Json],
    ctx: &ParsingContext<'_>,
) -> Result<Expression, CompileError> {
    let interpolation_key = ctx.child(1).key();
    let Some(raw_interpolation) = raw_args.first() else {
        return Err(CompileError::parse(
            "Expected an interpolation specification as the first argument",
            interpolation_key,
        ));
    };
    let interpolation = parse_interpolation(raw_interpolation, &interpolation_key)?;

    let mut args = vec![Expression::literal(interpolation_key, Value::Null)];
    for (i, raw) in raw_args[1..].iter().enumerate() {
        args.push(parser::parse(raw, &ctx.descend(i + 2, "curve"))?);
    }
    Ok(Expression {
        key: ctx.key(),
        kind: ExprKind::Call(Call {
            op: "curve",
            signature: operator.signature().clone(),
            args,
            extra: Some(CallExtra::Curve(interpolation)),
        }),
    })
}

fn parse_interpolation(raw: &Json, key: &str) -> Result<Interpolation, CompileError> {
    let invalid = || {
        CompileError::parse(
            "Invalid interpolation: expected [\"step\"], [\"linear\"], \
             or [\"exponential\", base]",
            key,
        )
    };
    let Json::Array(elements) = raw else {
        return Err(invalid());
    };
    match elements.first().and_then(Json::as_str) {
        Some("step") if elements.len() == 1 => Ok(Interpolation::Step),
        Some("linear") if elements.len() == 1 => Ok(Interpolation::Linear),
        Some("exponential") if elements.len() == 2 => {
            let base = elements[1].as_f64().ok_or_else(invalid)?;
            if base.is_finite() && base > 0.0 {
                Ok(Interpolation::Exponential { base })
            } else {
                Err(CompileError::parse(
                    "Exponential interpolation base must be a positive number",
                    key,
                ))
            }
        }
        _ => Err(invalid()),
    }
}

fn compile_curve(
    call: &Call,
    key: &str,
    args: Vec<CompiledArg>,
) -> Result<Emitted, Vec<CompileError>> {
    let interpolation = match &call.extra {
        Some(CallExtra::Curve(interpolation)) => *interpolation,
        _ => unreachable!("curve call without a parsed interpolation"),
    };
    if args.len() < 4 {
        return Err(vec![CompileError::compile(
            format!("Expected at least 4 arguments, got {}", args.len()),
            key,
        )]);
    }

    let mut errors = Vec::new();

    let mut stops = Vec::with_capacity((args.len() - 2) / 2);
    let mut previous: Option<f64> = None;
    for stop_in in call.args[2..].iter().step_by(2) {
        match &stop_in.kind {
            ExprKind::Literal {
                value: Value::Number(n),
                ..
            } => {
                if previous.is_some_and(|p| p >= *n) {
                    errors.push(CompileError::compile(
                        "Curve stop inputs must be in strictly ascending order",
                        &stop_in.key,
                    ));
                }
                previous = Some(*n);
                stops.push(*n);
            }
            _ => errors.push(CompileError::compile(
                "Curve stop inputs must be literal numbers, not computed expressions",
                &stop_in.key,
            )),
        }
    }

    let kind = match &args[3].ty {
        Type::Number => OutputKind::Number,
        Type::Color => OutputKind::Color,
        Type::Array { item, .. } if **item == Type::Number => OutputKind::NumberArray,
        other => {
            if interpolation != Interpolation::Step {
                errors.push(CompileError::compile(
                    format!(
                        "Type {other} is not interpolatable; curves with this output type \
                         must use [\"step\"] interpolation"
                    ),
                    key,
                ));
            }
            OutputKind::Stepped
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut nodes: Vec<EvalNode> = args.into_iter().map(|a| a.node).collect();
    let stop_nodes = nodes.split_off(2);
    let input = match nodes.pop() {
        Some(node) => node,
        None => unreachable!(),
    };
    let outputs: Vec<EvalNode> = stop_nodes.into_iter().skip(1).step_by(2).collect();

    Ok(Emitted::pure(EvalNode::Curve {
        input: Box::new(input),
        stops,
        outputs,
        interpolation,
        kind,
    }))
}

/// Evaluate a compiled curve at `input`. Inputs below the first stop clamp to
/// the first output, above the last stop to the last; in between, the two
/// neighboring outputs are evaluated and combined per the interpolation mode.
pub(crate) fn evaluate_curve(
    input: f64,
    stops: &[f64],
    outputs: &[EvalNode],
    interpolation: Interpolation,
    kind: OutputKind,
    ctx: &EvalContext<'_>,
) -> Result<Value, EvalError> {
    let idx = stops.partition_point(|stop| *stop <= input);
    if idx == 0 {
        return vm::evaluate(&outputs[0], ctx);
    }
    if idx >= stops.len() {
        return vm::evaluate(&outputs[outputs.len() - 1], ctx);
    }
    let (lower, upper) = (idx - 1, idx);
    if interpolation == Interpolation::Step || kind == OutputKind::Stepped {
        return vm::evaluate(&outputs[lower], ctx);
    }

    // Stops are strictly ascending, so the segment width is nonzero.
    let t = (input - stops[lower]) / (stops[upper] - stops[lower]);
    let a = vm::evaluate(&outputs[lower], ctx)?;
    let b = vm::evaluate(&outputs[upper], ctx)?;
    match kind {
        OutputKind::Number => {
            let a = vm::expect_number(&a)?;
            let b = vm::expect_number(&b)?;
            Ok(Value::Number(interpolate_scalar(interpolation, t, a, b)))
        }
        OutputKind::Color => {
            let a = vm::expect_color(&a)?.channels();
            let b = vm::expect_color(&b)?.channels();
            let mix = |i: usize| interpolate_scalar(interpolation, t, a[i], b[i]);
            crate::color::Color::from_channels(mix(0), mix(1), mix(2), mix(3).clamp(0.0, 1.0))
                .map(Value::Color)
                .ok_or_else(|| EvalError::new("Curve produced an out-of-range color"))
        }
        OutputKind::NumberArray => {
            let a = a
                .as_array()
                .ok_or_else(|| EvalError::new("Curve output is not an array"))?;
            let b = b
                .as_array()
                .ok_or_else(|| EvalError::new("Curve output is not an array"))?;
            if a.len() != b.len() {
                return Err(EvalError::new(
                    "Cannot interpolate between arrays of different lengths",
                ));
            }
            let mut out = Vec::with_capacity(a.len());
            for (a, b) in a.iter().zip(b) {
                out.push(Value::Number(interpolate_scalar(
                    interpolation,
                    t,
                    vm::expect_number(a)?,
                    vm::expect_number(b)?,
                )));
            }
            Ok(Value::Array(out))
        }
        OutputKind::Stepped => unreachable!("stepped curves return before interpolating"),
    }
}

/// Scalar interpolation between adjacent stop outputs at linear progress `t`.
/// Exponential mode interpolates in log space, `y0 · base^(t · log_base(y1/y0))`,
/// falling back to the linear form when the log space is undefined (base 1 or
/// a non-positive endpoint).
fn interpolate_scalar(interpolation: Interpolation, t: f64, y0: f64, y1: f64) -> f64 {
    match interpolation {
        Interpolation::Step => y0,
        Interpolation::Linear => y0 + (y1 - y0) * t,
        Interpolation::Exponential { base } => {
            if base == 1.0 || y0 <= 0.0 || y1 <= 0.0 {
                y0 + (y1 - y0) * t
            } else {
                y0 * base.powf(t * (y1 / y0).log(base))
            }
        }
    }
}
