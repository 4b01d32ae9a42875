//! The executable intermediate form and its interpreter.
//!
//! Operator compilation emits `EvalNode` trees; evaluation walks them against
//! the map globals and the optional feature. Children of decision forms
//! (`case`, `match`, `coalesce`) and of curve stops are only evaluated when
//! selected, so unselected branches cost nothing and cannot fail.

use std::collections::HashMap;

use crate::color::Color;
use crate::curve::{self, Interpolation, OutputKind};
use crate::error::EvalError;
use crate::match_op::MatchKey;
use crate::types::Type;
use crate::value::{Feature, Globals, Value};

/// One-argument math operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Math1 {
    Log10,
    Ln,
    Log2,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
}

/// Two-argument math operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Math2 {
    Sub,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

/// Runtime type assertions: verify and pass through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assertion {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    ToString,
    ToNumber,
    ToBoolean,
    ToRgba,
}

/// A compiled expression node.
#[derive(Debug, Clone)]
pub enum EvalNode {
    Const(Value),
    Sum(Vec<EvalNode>),
    Product(Vec<EvalNode>),
    Math1(Math1, Box<EvalNode>),
    Math2(Math2, Box<EvalNode>, Box<EvalNode>),
    Compare(CmpOp, Box<EvalNode>, Box<EvalNode>),
    All(Vec<EvalNode>),
    Any(Vec<EvalNode>),
    Not(Box<EvalNode>),
    Upcase(Box<EvalNode>),
    Downcase(Box<EvalNode>),
    Concat(Vec<EvalNode>),
    TypeOf(Box<EvalNode>),
    Assert(Assertion, Box<EvalNode>),
    Coerce(Coercion, Box<EvalNode>),
    ParseColor(Box<EvalNode>),
    Rgba {
        r: Box<EvalNode>,
        g: Box<EvalNode>,
        b: Box<EvalNode>,
        a: Box<EvalNode>,
    },
    /// `get`/`has` against the implicit feature properties.
    GetProperty(Box<EvalNode>),
    HasProperty(Box<EvalNode>),
    /// `get`/`has` against an explicit object.
    GetFrom {
        key: Box<EvalNode>,
        object: Box<EvalNode>,
    },
    HasIn {
        key: Box<EvalNode>,
        object: Box<EvalNode>,
    },
    At {
        index: Box<EvalNode>,
        array: Box<EvalNode>,
    },
    Length(Box<EvalNode>),
    Properties,
    GeometryType,
    Id,
    Zoom,
    Case {
        branches: Vec<(EvalNode, EvalNode)>,
        fallback: Box<EvalNode>,
    },
    Match {
        input: Box<EvalNode>,
        table: HashMap<MatchKey, usize>,
        outputs: Vec<EvalNode>,
        fallback: Box<EvalNode>,
    },
    Coalesce(Vec<EvalNode>),
    Curve {
        input: Box<EvalNode>,
        stops: Vec<f64>,
        outputs: Vec<EvalNode>,
        interpolation: Interpolation,
        kind: OutputKind,
    },
}

/// Evaluation inputs: the map-properties bag and the current feature.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub globals: &'a Globals,
    pub feature: Option<&'a Feature>,
}

pub fn evaluate(node: &EvalNode, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match node {
        EvalNode::Const(value) => Ok(value.clone()),

        EvalNode::Sum(terms) => fold_numbers(terms, ctx, 0.0, |acc, n| acc + n),
        EvalNode::Product(factors) => fold_numbers(factors, ctx, 1.0, |acc, n| acc * n),

        EvalNode::Math1(op, operand) => {
            let x = expect_number(&evaluate(operand, ctx)?)?;
            Ok(Value::Number(match op {
                Math1::Log10 => x.log10(),
                Math1::Ln => x.ln(),
                Math1::Log2 => x.log2(),
                Math1::Sin => x.sin(),
                Math1::Cos => x.cos(),
                Math1::Tan => x.tan(),
                Math1::Asin => x.asin(),
                Math1::Acos => x.acos(),
                Math1::Atan => x.atan(),
            }))
        }

        EvalNode::Math2(op, lhs, rhs) => {
            let a = expect_number(&evaluate(lhs, ctx)?)?;
            let b = expect_number(&evaluate(rhs, ctx)?)?;
            Ok(Value::Number(match op {
                Math2::Sub => a - b,
                Math2::Div => a / b,
                Math2::Mod => a % b,
                Math2::Pow => a.powf(b),
            }))
        }

        EvalNode::Compare(op, lhs, rhs) => {
            let a = evaluate(lhs, ctx)?;
            let b = evaluate(rhs, ctx)?;
            let result = match op {
                CmpOp::Eq => a == b,
                CmpOp::Ne => a != b,
                CmpOp::Gt | CmpOp::Lt | CmpOp::Ge | CmpOp::Le => {
                    let ordering = compare_ordered(&a, &b)?;
                    match op {
                        CmpOp::Gt => ordering == std::cmp::Ordering::Greater,
                        CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                        CmpOp::Ge => ordering != std::cmp::Ordering::Less,
                        CmpOp::Le => ordering != std::cmp::Ordering::Greater,
                        CmpOp::Eq | CmpOp::Ne => unreachable!(),
                    }
                }
            };
            Ok(Value::Boolean(result))
        }

        EvalNode::All(operands) => {
            for operand in operands {
                if !expect_boolean(&evaluate(operand, ctx)?)? {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }
        EvalNode::Any(operands) => {
            for operand in operands {
                if expect_boolean(&evaluate(operand, ctx)?)? {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }
        EvalNode::Not(operand) => Ok(Value::Boolean(!expect_boolean(&evaluate(operand, ctx)?)?)),

        EvalNode::Upcase(operand) => {
            let s = evaluate(operand, ctx)?;
            Ok(Value::String(expect_string(&s)?.to_uppercase()))
        }
        EvalNode::Downcase(operand) => {
            let s = evaluate(operand, ctx)?;
            Ok(Value::String(expect_string(&s)?.to_lowercase()))
        }
        EvalNode::Concat(operands) => {
            let mut out = String::new();
            for operand in operands {
                out.push_str(&to_string_value(&evaluate(operand, ctx)?));
            }
            Ok(Value::String(out))
        }

        EvalNode::TypeOf(operand) => {
            Ok(Value::String(evaluate(operand, ctx)?.type_of().to_string()))
        }

        EvalNode::Assert(assertion, operand) => {
            let value = evaluate(operand, ctx)?;
            let ok = match assertion {
                Assertion::String => matches!(value, Value::String(_)),
                Assertion::Number => matches!(value, Value::Number(_)),
                Assertion::Boolean => matches!(value, Value::Boolean(_)),
                Assertion::Object => matches!(value, Value::Object(_)),
                Assertion::Array => matches!(value, Value::Array(_)),
            };
            if ok {
                Ok(value)
            } else {
                let expected = match assertion {
                    Assertion::String => Type::String,
                    Assertion::Number => Type::Number,
                    Assertion::Boolean => Type::Boolean,
                    Assertion::Object => Type::Object,
                    Assertion::Array => Type::array(Type::Value),
                };
                Err(type_mismatch(&expected, &value))
            }
        }

        EvalNode::Coerce(coercion, operand) => {
            let value = evaluate(operand, ctx)?;
            match coercion {
                Coercion::ToString => Ok(Value::String(to_string_value(&value))),
                Coercion::ToNumber => Ok(Value::Number(to_number(&value)?)),
                Coercion::ToBoolean => Ok(Value::Boolean(to_boolean(&value))),
                Coercion::ToRgba => {
                    let color = expect_color(&value)?;
                    Ok(Value::Array(
                        color.channels().iter().map(|c| Value::Number(*c)).collect(),
                    ))
                }
            }
        }

        EvalNode::ParseColor(operand) => {
            let value = evaluate(operand, ctx)?;
            let s = expect_string(&value)?;
            Color::parse(s)
                .map(Value::Color)
                .ok_or_else(|| EvalError::new(format!("Could not parse color from value \"{s}\"")))
        }

        EvalNode::Rgba { r, g, b, a } => {
            let r = expect_number(&evaluate(r, ctx)?)?;
            let g = expect_number(&evaluate(g, ctx)?)?;
            let b = expect_number(&evaluate(b, ctx)?)?;
            let a = expect_number(&evaluate(a, ctx)?)?;
            Color::from_channels(r, g, b, a)
                .map(Value::Color)
                .ok_or_else(|| {
                    EvalError::new(format!(
                        "Invalid rgba value ({r}, {g}, {b}, {a}): \
                         channels must be in [0, 255] and alpha in [0, 1]"
                    ))
                })
        }

        EvalNode::GetProperty(key) => {
            let key = evaluate(key, ctx)?;
            let feature = expect_feature(ctx)?;
            Ok(feature
                .properties
                .get(expect_string(&key)?)
                .cloned()
                .unwrap_or(Value::Null))
        }
        EvalNode::HasProperty(key) => {
            let key = evaluate(key, ctx)?;
            let feature = expect_feature(ctx)?;
            Ok(Value::Boolean(
                feature.properties.contains_key(expect_string(&key)?),
            ))
        }
        EvalNode::GetFrom { key, object } => {
            let key = evaluate(key, ctx)?;
            let object = evaluate(object, ctx)?;
            Ok(expect_object(&object)?
                .get(expect_string(&key)?)
                .cloned()
                .unwrap_or(Value::Null))
        }
        EvalNode::HasIn { key, object } => {
            let key = evaluate(key, ctx)?;
            let object = evaluate(object, ctx)?;
            Ok(Value::Boolean(
                expect_object(&object)?.contains_key(expect_string(&key)?),
            ))
        }

        EvalNode::At { index, array } => {
            let index = expect_number(&evaluate(index, ctx)?)?;
            let array = evaluate(array, ctx)?;
            let items = expect_array(&array)?;
            if index.fract() != 0.0 {
                return Err(EvalError::new(format!(
                    "Array index must be an integer, got {index}"
                )));
            }
            if index < 0.0 || index >= items.len() as f64 {
                return Err(EvalError::new(format!(
                    "Array index out of bounds: {index} is not in [0, {}]",
                    items.len().saturating_sub(1)
                )));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let index = index as usize;
            Ok(items[index].clone())
        }

        EvalNode::Length(operand) => {
            let value = evaluate(operand, ctx)?;
            match &value {
                Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
                Value::Array(items) => Ok(Value::Number(items.len() as f64)),
                _ => Err(type_mismatch(
                    &Type::Variant(vec![Type::array(Type::Value), Type::String]),
                    &value,
                )),
            }
        }

        EvalNode::Properties => {
            let feature = expect_feature(ctx)?;
            Ok(Value::Object(feature.properties.clone()))
        }
        EvalNode::GeometryType => {
            let feature = expect_feature(ctx)?;
            feature
                .geometry_type
                .clone()
                .map(Value::String)
                .ok_or_else(|| EvalError::new("Feature geometry is not available in this context"))
        }
        EvalNode::Id => {
            let feature = expect_feature(ctx)?;
            Ok(feature.id.clone().unwrap_or(Value::Null))
        }
        EvalNode::Zoom => Ok(Value::Number(ctx.globals.zoom)),

        EvalNode::Case { branches, fallback } => {
            for (condition, output) in branches {
                if expect_boolean(&evaluate(condition, ctx)?)? {
                    return evaluate(output, ctx);
                }
            }
            evaluate(fallback, ctx)
        }

        EvalNode::Match {
            input,
            table,
            outputs,
            fallback,
        } => {
            let input = evaluate(input, ctx)?;
            match MatchKey::of(&input).and_then(|key| table.get(&key)) {
                Some(branch) => evaluate(&outputs[*branch], ctx),
                None => evaluate(fallback, ctx),
            }
        }

        EvalNode::Coalesce(operands) => {
            let mut last_error = None;
            for operand in operands {
                match evaluate(operand, ctx) {
                    Ok(value) => return Ok(value),
                    Err(error) => last_error = Some(error),
                }
            }
            Err(last_error
                .unwrap_or_else(|| EvalError::new("Expected at least one operand to coalesce")))
        }

        EvalNode::Curve {
            input,
            stops,
            outputs,
            interpolation,
            kind,
        } => {
            let input = expect_number(&evaluate(input, ctx)?)?;
            curve::evaluate_curve(input, stops, outputs, *interpolation, *kind, ctx)
        }
    }
}

fn fold_numbers(
    operands: &[EvalNode],
    ctx: &EvalContext<'_>,
    init: f64,
    combine: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    let mut acc = init;
    for operand in operands {
        acc = combine(acc, expect_number(&evaluate(operand, ctx)?)?);
    }
    Ok(Value::Number(acc))
}

fn compare_ordered(a: &Value, b: &Value) -> Result<std::cmp::Ordering, EvalError> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => Ok(a
            .partial_cmp(b)
            .unwrap_or(std::cmp::Ordering::Equal)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(EvalError::new(format!(
            "Cannot compare {} and {}",
            a.type_of(),
            b.type_of()
        ))),
    }
}

fn type_mismatch(expected: &Type, found: &Value) -> EvalError {
    EvalError::new(format!(
        "Expected {expected} but found {} instead.",
        found.type_of()
    ))
}

fn expect_feature<'a>(ctx: &EvalContext<'a>) -> Result<&'a Feature, EvalError> {
    ctx.feature
        .ok_or_else(|| EvalError::new("Feature data is not available in this context"))
}

pub(crate) fn expect_number(value: &Value) -> Result<f64, EvalError> {
    value
        .as_number()
        .ok_or_else(|| type_mismatch(&Type::Number, value))
}

pub(crate) fn expect_string(value: &Value) -> Result<&str, EvalError> {
    value
        .as_str()
        .ok_or_else(|| type_mismatch(&Type::String, value))
}

pub(crate) fn expect_boolean(value: &Value) -> Result<bool, EvalError> {
    value
        .as_boolean()
        .ok_or_else(|| type_mismatch(&Type::Boolean, value))
}

pub(crate) fn expect_color(value: &Value) -> Result<Color, EvalError> {
    value
        .as_color()
        .ok_or_else(|| type_mismatch(&Type::Color, value))
}

fn expect_object(value: &Value) -> Result<&std::collections::BTreeMap<String, Value>, EvalError> {
    value
        .as_object()
        .ok_or_else(|| type_mismatch(&Type::Object, value))
}

fn expect_array(value: &Value) -> Result<&[Value], EvalError> {
    value
        .as_array()
        .ok_or_else(|| type_mismatch(&Type::array(Type::Value), value))
}

/// String form of any value: the `to_string` coercion and `concat`'s
/// per-operand rendering.
pub(crate) fn to_string_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Color(c) => c.to_string(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string(&value.to_json()).unwrap_or_default()
        }
    }
}

pub(crate) fn to_number(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Boolean(true) => Ok(1.0),
        Value::Boolean(false) | Value::Null => Ok(0.0),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            EvalError::new(format!("Could not convert \"{s}\" to a number"))
        }),
        _ => Err(EvalError::new(format!(
            "Could not convert {} to a number",
            value.type_of()
        ))),
    }
}

/// Falsy values: `null`, `false`, `0`, `NaN`, and the empty string.
pub(crate) fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Null | Value::Boolean(false) => false,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
