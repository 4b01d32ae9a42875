//! The compile driver: walks the specialized expression tree, invokes each
//! operator's compile function, aggregates purity bits, and accumulates
//! errors across sibling branches.

use crate::ast::{Expression, ExprKind};
use crate::builtins::Registry;
use crate::error::{CompileError, EvalError};
use crate::types::Type;
use crate::value::{Feature, Globals, Value};
use crate::vm::{self, EvalContext, EvalNode};

/// A successfully compiled expression: the executable form, its result type,
/// purity flags, and the specialized source tree it was compiled from.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    node: EvalNode,
    ty: Type,
    is_feature_constant: bool,
    is_zoom_constant: bool,
    expression: Expression,
}

impl CompiledExpression {
    /// Evaluate against the map-properties bag and an optional feature. The
    /// arguments are only borrowed for the duration of the call.
    pub fn evaluate(
        &self,
        globals: &Globals,
        feature: Option<&Feature>,
    ) -> Result<Value, EvalError> {
        vm::evaluate(&self.node, &EvalContext { globals, feature })
    }

    /// The specialized result type.
    pub fn result_type(&self) -> &Type {
        &self.ty
    }

    /// True when the result cannot depend on per-feature data.
    pub fn is_feature_constant(&self) -> bool {
        self.is_feature_constant
    }

    /// True when the result cannot depend on the map's zoom level.
    pub fn is_zoom_constant(&self) -> bool {
        self.is_zoom_constant
    }

    /// The type-checked expression this was compiled from.
    pub fn source(&self) -> &Expression {
        &self.expression
    }
}

/// One compiled argument handed to an operator's compile function.
pub(crate) struct CompiledArg {
    pub node: EvalNode,
    pub ty: Type,
    pub key: String,
    pub is_feature_constant: bool,
    pub is_zoom_constant: bool,
}

/// An operator's compile output: the emitted node plus the operator's own
/// purity report. The driver ANDs the report with the children's flags.
pub(crate) struct Emitted {
    pub node: EvalNode,
    pub is_feature_constant: bool,
    pub is_zoom_constant: bool,
}

impl Emitted {
    /// An emission that is constant as far as the operator itself is
    /// concerned; any dependence comes from the children.
    pub fn pure(node: EvalNode) -> Self {
        Self {
            node,
            is_feature_constant: true,
            is_zoom_constant: true,
        }
    }

    pub fn feature_dependent(node: EvalNode) -> Self {
        Self {
            node,
            is_feature_constant: false,
            is_zoom_constant: true,
        }
    }

    pub fn zoom_dependent(node: EvalNode) -> Self {
        Self {
            node,
            is_feature_constant: true,
            is_zoom_constant: false,
        }
    }
}

/// Compile a type-checked tree into its executable form.
pub(crate) fn compile_checked(
    expr: &Expression,
    registry: &Registry,
) -> Result<CompiledExpression, Vec<CompileError>> {
    let emitted = compile_node(expr, registry)?;
    Ok(CompiledExpression {
        node: emitted.node,
        ty: expr.result_type().clone(),
        is_feature_constant: emitted.is_feature_constant,
        is_zoom_constant: emitted.is_zoom_constant,
        expression: expr.clone(),
    })
}

fn compile_node(expr: &Expression, registry: &Registry) -> Result<Emitted, Vec<CompileError>> {
    match &expr.kind {
        ExprKind::Literal { value, .. } => Ok(Emitted::pure(EvalNode::Const(value.clone()))),
        ExprKind::Call(call) => {
            let mut errors = Vec::new();
            let mut compiled = Vec::with_capacity(call.args.len());
            for arg in &call.args {
                match compile_node(arg, registry) {
                    Ok(emitted) => compiled.push(CompiledArg {
                        node: emitted.node,
                        ty: arg.result_type().clone(),
                        key: arg.key.clone(),
                        is_feature_constant: emitted.is_feature_constant,
                        is_zoom_constant: emitted.is_zoom_constant,
                    }),
                    Err(mut arg_errors) => errors.append(&mut arg_errors),
                }
            }
            if !errors.is_empty() {
                return Err(errors);
            }

            let feature_constant = compiled.iter().all(|a| a.is_feature_constant);
            let zoom_constant = compiled.iter().all(|a| a.is_zoom_constant);
            let operator = match registry.get(call.op) {
                Some(operator) => operator,
                None => unreachable!("parsed call names an unregistered operator"),
            };
            let emitted = operator.compile(call, &expr.key, compiled)?;
            Ok(Emitted {
                node: emitted.node,
                is_feature_constant: feature_constant && emitted.is_feature_constant,
                is_zoom_constant: zoom_constant && emitted.is_zoom_constant,
            })
        }
    }
}
