//! Expression nodes produced by the parser and re-stamped by the type checker.

use std::collections::HashMap;

use crate::curve::Interpolation;
use crate::match_op::MatchKey;
use crate::types::{LambdaType, Type};
use crate::value::Value;

/// A node in the expression tree. `key` is the dotted path of the node in the
/// raw input, used to anchor diagnostics.
#[derive(Debug, Clone)]
pub struct Expression {
    pub key: String,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal { value: Value, ty: Type },
    Call(Call),
}

/// An operator invocation. `signature` starts as the registry template and is
/// replaced by the type checker with the specialized lambda (typenames
/// solved, variadic groups expanded to one param per argument).
#[derive(Debug, Clone)]
pub struct Call {
    pub op: &'static str,
    pub signature: LambdaType,
    pub args: Vec<Expression>,
    pub extra: Option<CallExtra>,
}

/// Operator-specific payload attached at parse time.
#[derive(Debug, Clone)]
pub enum CallExtra {
    Curve(Interpolation),
    Match(HashMap<MatchKey, usize>),
}

impl Expression {
    /// A literal node; its type is derived from the value.
    pub fn literal(key: impl Into<String>, value: Value) -> Self {
        let ty = value.type_of();
        Self {
            key: key.into(),
            kind: ExprKind::Literal { value, ty },
        }
    }

    /// The type this node produces: the literal's type, or the call
    /// signature's result.
    pub fn result_type(&self) -> &Type {
        match &self.kind {
            ExprKind::Literal { ty, .. } => ty,
            ExprKind::Call(call) => &call.signature.result,
        }
    }
}
