//! Type checking and generic specialization.
//!
//! `check` walks the parsed tree with an expected type, unifies each call's
//! declared signature against its arguments, solves `Typename` variables
//! consistently across the call, and returns a re-stamped tree whose call
//! signatures are fully specialized (variadic groups expanded, typenames
//! substituted). Errors across sibling arguments are accumulated so one pass
//! reports as many problems as possible.

use crate::ast::{Call, Expression, ExprKind};
use crate::error::CompileError;
use crate::types::{
    match_type, substitute, unresolved_typename, Bindings, LambdaType, Type,
};

/// Check `expr` against `expected`, returning the specialized tree.
pub fn check(expected: &Type, expr: &Expression) -> Result<Expression, Vec<CompileError>> {
    match &expr.kind {
        ExprKind::Literal { ty, .. } => {
            let mut bindings = Bindings::new();
            match_type(expected, ty, &mut bindings)
                .map_err(|message| vec![CompileError::type_error(message, &expr.key)])?;
            Ok(expr.clone())
        }
        ExprKind::Call(call) => check_call(expected, expr, call),
    }
}

fn check_call(
    expected: &Type,
    expr: &Expression,
    call: &Call,
) -> Result<Expression, Vec<CompileError>> {
    let params = expand_params(&call.signature.params, call.args.len())
        .map_err(|message| vec![CompileError::type_error(message, &expr.key)])?;

    // Typenames are scoped to this call; the enclosing call's solutions have
    // already been substituted into `expected`.
    let mut bindings = Bindings::new();
    match_type(expected, &call.signature.result, &mut bindings)
        .map_err(|message| vec![CompileError::type_error(message, &expr.key)])?;

    let mut errors = Vec::new();
    let mut checked_args = Vec::with_capacity(call.args.len());
    for (arg, param) in call.args.iter().zip(&params) {
        // A typename still unbound here imposes no constraint on the child;
        // it is solved from the child's actual type just below. Erasing it
        // keeps this call's typenames from leaking into the child's scope.
        let expected_arg = erase_typenames(&substitute(param, &bindings));
        match check(&expected_arg, arg) {
            Ok(checked) => {
                // Solve typenames from the argument's concrete type so later
                // arguments are checked against the bound type.
                let _ = match_type(param, checked.result_type(), &mut bindings);
                checked_args.push(checked);
            }
            Err(mut arg_errors) => errors.append(&mut arg_errors),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let result = substitute(&call.signature.result, &bindings);
    let params: Vec<Type> = params.iter().map(|p| substitute(p, &bindings)).collect();
    for ty in params.iter().chain(std::iter::once(&result)) {
        if let Some(name) = unresolved_typename(ty) {
            return Err(vec![CompileError::type_error(
                format!("Could not infer type of {name}"),
                &expr.key,
            )]);
        }
    }

    Ok(Expression {
        key: expr.key.clone(),
        kind: ExprKind::Call(Call {
            op: call.op,
            signature: LambdaType { result, params },
            args: checked_args,
            extra: call.extra.clone(),
        }),
    })
}

/// Replace every `Typename` with `Value`, turning a partially-solved
/// expectation into a ground one.
fn erase_typenames(ty: &Type) -> Type {
    match ty {
        Type::Typename(_) => Type::Value,
        Type::Array { item, len } => Type::Array {
            item: Box::new(erase_typenames(item)),
            len: *len,
        },
        Type::Variant(members) => {
            Type::Variant(members.iter().map(erase_typenames).collect())
        }
        Type::Lambda(l) => Type::Lambda(Box::new(LambdaType {
            result: erase_typenames(&l.result),
            params: l.params.iter().map(erase_typenames).collect(),
        })),
        Type::NArgs { items, min, max } => Type::NArgs {
            items: items.iter().map(erase_typenames).collect(),
            min: *min,
            max: *max,
        },
        _ => ty.clone(),
    }
}

/// Materialize a parameter list for `argc` arguments: fixed params are kept
/// in place and the variadic group, if any, repeats its item block to cover
/// the remaining slots within its min/max repetition bounds.
fn expand_params(params: &[Type], argc: usize) -> Result<Vec<Type>, String> {
    let group_at = params
        .iter()
        .position(|p| matches!(p, Type::NArgs { .. }));
    let Some(group_at) = group_at else {
        if argc != params.len() {
            return Err(format!(
                "Expected {} arguments, got {argc}",
                params.len()
            ));
        }
        return Ok(params.to_vec());
    };

    let Type::NArgs { items, min, max } = &params[group_at] else {
        return Err(String::from("invalid signature"));
    };
    let fixed = params.len() - 1;
    let block = items.len().max(1);
    let min_total = fixed + min * block;
    if argc < min_total {
        return Err(format!("Expected at least {min_total} arguments, got {argc}"));
    }
    if let Some(max) = max {
        let max_total = fixed + max * block;
        if argc > max_total {
            return Err(format!("Expected at most {max_total} arguments, got {argc}"));
        }
    }
    let variadic = argc - fixed;
    if variadic % block != 0 {
        return Err(format!(
            "Expected {fixed} arguments plus a multiple of {block}, got {argc}"
        ));
    }

    let mut expanded = Vec::with_capacity(argc);
    expanded.extend_from_slice(&params[..group_at]);
    for _ in 0..variadic / block {
        expanded.extend(items.iter().cloned());
    }
    expanded.extend_from_slice(&params[group_at + 1..]);
    Ok(expanded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builtins::Registry;
    use crate::parser::{parse, ParsingContext};
    use serde_json::json;

    fn check_src(raw: serde_json::Value) -> Expression {
        let registry = Registry::new();
        let parsed = parse(&raw, &ParsingContext::new(&registry)).unwrap();
        check(&Type::Value, &parsed).unwrap()
    }

    fn check_src_err(raw: serde_json::Value) -> Vec<CompileError> {
        let registry = Registry::new();
        let parsed = parse(&raw, &ParsingContext::new(&registry)).unwrap();
        check(&Type::Value, &parsed).unwrap_err()
    }

    fn call_of(expr: &Expression) -> &Call {
        match &expr.kind {
            ExprKind::Call(call) => call,
            ExprKind::Literal { .. } => panic!("expected a call"),
        }
    }

    #[test]
    fn variadic_sum_specializes_per_argument() {
        let expr = check_src(json!(["+", 1, 2, 3]));
        let call = call_of(&expr);
        assert_eq!(call.signature.params, vec![Type::Number; 3]);
        assert_eq!(call.signature.result, Type::Number);
    }

    #[test]
    fn arity_error_for_fixed_operators() {
        let errors = check_src_err(json!(["-", 1]));
        assert_eq!(errors[0].message, "Expected 2 arguments, got 1");
        assert_eq!(errors[0].key, "");
    }

    #[test]
    fn arity_error_for_variadic_minimum() {
        let errors = check_src_err(json!(["+", 1]));
        assert_eq!(errors[0].message, "Expected at least 2 arguments, got 1");
    }

    #[test]
    fn equality_binds_its_typevar_from_the_first_argument() {
        let errors = check_src_err(json!(["==", 1, "a"]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "2");
        assert_eq!(errors[0].message, "Expected Number but found String instead.");
    }

    #[test]
    fn equality_accepts_matching_types() {
        let expr = check_src(json!(["==", "a", "b"]));
        let call = call_of(&expr);
        assert_eq!(call.signature.params, vec![Type::String, Type::String]);
        assert_eq!(call.signature.result, Type::Boolean);
    }

    #[test]
    fn at_infers_its_result_from_the_array_items() {
        let expr = check_src(json!(["at", 1, ["literal", [1, 2, 3]]]));
        let call = call_of(&expr);
        assert_eq!(call.signature.result, Type::Number);
    }

    #[test]
    fn case_unifies_outputs_and_default() {
        let expr = check_src(json!(["case", ["==", 1, 1], "yes", "no"]));
        let call = call_of(&expr);
        assert_eq!(call.signature.result, Type::String);
    }

    #[test]
    fn case_rejects_mismatched_outputs() {
        let errors = check_src_err(json!(["case", ["==", 1, 1], "yes", 2]));
        assert_eq!(errors[0].key, "3");
        assert_eq!(errors[0].message, "Expected String but found Number instead.");
    }

    #[test]
    fn errors_accumulate_across_sibling_arguments() {
        let errors = check_src_err(json!(["+", "a", true, 1]));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].key, "1");
        assert_eq!(errors[1].key, "2");
    }

    #[test]
    fn expected_type_constrains_the_root() {
        let registry = Registry::new();
        let parsed = parse(&json!(["get", "name"]), &ParsingContext::new(&registry)).unwrap();
        // `get` returns Value, which satisfies a Number expectation only via
        // an assertion; expecting Number directly must fail.
        let errors = check(&Type::Number, &parsed).unwrap_err();
        assert_eq!(errors[0].key, "");
    }

    #[test]
    fn assertion_narrows_value_to_number() {
        let registry = Registry::new();
        let parsed = parse(
            &json!(["number", ["get", "name"]]),
            &ParsingContext::new(&registry),
        )
        .unwrap();
        let checked = check(&Type::Number, &parsed).unwrap();
        assert_eq!(*checked.result_type(), Type::Number);
    }

    #[test]
    fn length_accepts_strings_and_arrays() {
        check_src(json!(["length", "abc"]));
        check_src(json!(["length", ["literal", [1, 2]]]));
        let errors = check_src_err(json!(["length", 1]));
        assert_eq!(errors[0].key, "1");
    }

    #[test]
    fn get_accepts_an_optional_object_argument() {
        check_src(json!(["get", "k"]));
        check_src(json!(["get", "k", ["object", ["get", "nested"]]]));
        let errors = check_src_err(json!(["get", "k", ["object", ["get", "nested"]], 3]));
        assert!(errors[0].message.starts_with("Expected at most 2"));
    }

    #[test]
    fn expand_params_handles_fixed_suffix_after_group() {
        // case: pairs then default
        let params = vec![
            Type::nargs(vec![Type::Boolean, Type::Typename("T")], 1),
            Type::Typename("T"),
        ];
        let expanded = expand_params(&params, 5).unwrap();
        assert_eq!(expanded.len(), 5);
        assert_eq!(expanded[0], Type::Boolean);
        assert_eq!(expanded[4], Type::Typename("T"));
        assert!(expand_params(&params, 4).is_err());
    }
}
