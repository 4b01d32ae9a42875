//! The type algebra of the expression language.
//!
//! Operator signatures are lambda types over these; the checker solves
//! `Typename` variables by one-way unification of an expected type against
//! the actual type of each argument.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Null,
    String,
    Number,
    Boolean,
    Color,
    /// A map-shaped value with string keys.
    Object,
    /// The top type: any value satisfies it.
    Value,
    /// Array with an item type and, optionally, a required length.
    Array { item: Box<Type>, len: Option<usize> },
    /// Satisfied by any one of the member types.
    Variant(Vec<Type>),
    /// A generic type variable; only meaningful inside a lambda signature.
    Typename(&'static str),
    Lambda(Box<LambdaType>),
    /// A variadic parameter group: `items` repeats as a block to cover the
    /// actual argument count, between `min` and `max` repetitions.
    NArgs {
        items: Vec<Type>,
        min: usize,
        max: Option<usize>,
    },
}

/// An operator signature: result type plus ordered parameter types.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaType {
    pub result: Type,
    pub params: Vec<Type>,
}

/// Solved generic variables, threaded through one lambda-call check.
pub type Bindings = HashMap<&'static str, Type>;

impl Type {
    pub fn array(item: Type) -> Type {
        Type::Array {
            item: Box::new(item),
            len: None,
        }
    }

    pub fn array_n(item: Type, len: usize) -> Type {
        Type::Array {
            item: Box::new(item),
            len: Some(len),
        }
    }

    pub fn nargs(items: Vec<Type>, min: usize) -> Type {
        Type::NArgs {
            items,
            min,
            max: None,
        }
    }

    pub fn nargs_between(items: Vec<Type>, min: usize, max: usize) -> Type {
        Type::NArgs {
            items,
            min,
            max: Some(max),
        }
    }
}

pub fn lambda(result: Type, params: Vec<Type>) -> LambdaType {
    LambdaType { result, params }
}

/// Unify `expected` against `actual`, solving `Typename`s into `bindings`.
///
/// `Value` on the expected side accepts anything. A `Typename` on either side
/// is looked up in (or added to) `bindings`; typenames only ever originate
/// from operator signatures, so no occurs-check is needed.
pub fn match_type(expected: &Type, actual: &Type, bindings: &mut Bindings) -> Result<(), String> {
    match (expected, actual) {
        (Type::Value, _) => Ok(()),
        (Type::Typename(name), _) => match bindings.get(name).cloned() {
            Some(bound) => match_type(&bound, actual, bindings),
            None => {
                bindings.insert(*name, actual.clone());
                Ok(())
            }
        },
        (_, Type::Typename(name)) => match bindings.get(name).cloned() {
            Some(bound) => match_type(expected, &bound, bindings),
            None => {
                bindings.insert(*name, expected.clone());
                Ok(())
            }
        },
        (Type::Variant(members), _) => {
            let mut reasons = Vec::with_capacity(members.len());
            for member in members {
                // A failed member must not leak partial bindings.
                let mut scratch = bindings.clone();
                match match_type(member, actual, &mut scratch) {
                    Ok(()) => {
                        *bindings = scratch;
                        return Ok(());
                    }
                    Err(reason) => reasons.push(reason),
                }
            }
            Err(format!(
                "Expected {expected} but found {actual} instead ({})",
                reasons.join("; ")
            ))
        }
        (
            Type::Array {
                item: expected_item,
                len: expected_len,
            },
            Type::Array {
                item: actual_item,
                len: actual_len,
            },
        ) => {
            match_type(expected_item, actual_item, bindings)
                .map_err(|_| format!("Expected {expected} but found {actual} instead."))?;
            match expected_len {
                Some(n) if *actual_len != Some(*n) => {
                    Err(format!("Expected {expected} but found {actual} instead."))
                }
                _ => Ok(()),
            }
        }
        _ if expected == actual => Ok(()),
        _ => Err(format!("Expected {expected} but found {actual} instead.")),
    }
}

/// Replace every bound `Typename` in `ty`; unbound typenames remain.
pub fn substitute(ty: &Type, bindings: &Bindings) -> Type {
    match ty {
        Type::Typename(name) => bindings.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Type::Array { item, len } => Type::Array {
            item: Box::new(substitute(item, bindings)),
            len: *len,
        },
        Type::Variant(members) => {
            Type::Variant(members.iter().map(|m| substitute(m, bindings)).collect())
        }
        Type::Lambda(l) => Type::Lambda(Box::new(LambdaType {
            result: substitute(&l.result, bindings),
            params: l.params.iter().map(|p| substitute(p, bindings)).collect(),
        })),
        Type::NArgs { items, min, max } => Type::NArgs {
            items: items.iter().map(|i| substitute(i, bindings)).collect(),
            min: *min,
            max: *max,
        },
        _ => ty.clone(),
    }
}

/// First `Typename` left anywhere inside `ty`, if any.
pub fn unresolved_typename(ty: &Type) -> Option<&'static str> {
    match ty {
        Type::Typename(name) => Some(*name),
        Type::Array { item, .. } => unresolved_typename(item),
        Type::Variant(members) => members.iter().find_map(unresolved_typename),
        Type::Lambda(l) => unresolved_typename(&l.result)
            .or_else(|| l.params.iter().find_map(unresolved_typename)),
        Type::NArgs { items, .. } => items.iter().find_map(unresolved_typename),
        _ => None,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Null => write!(f, "Null"),
            Type::String => write!(f, "String"),
            Type::Number => write!(f, "Number"),
            Type::Boolean => write!(f, "Boolean"),
            Type::Color => write!(f, "Color"),
            Type::Object => write!(f, "Object"),
            Type::Value => write!(f, "Value"),
            Type::Array {
                item,
                len: Some(len),
            } => write!(f, "Array<{item}, {len}>"),
            Type::Array { item, len: None } => write!(f, "Array<{item}>"),
            Type::Variant(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
            Type::Typename(name) => write!(f, "{name}"),
            Type::Lambda(l) => write!(f, "{l}"),
            Type::NArgs { items, .. } => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ", ...")
            }
        }
    }
}

impl fmt::Display for LambdaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") => {}", self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_accepts_anything() {
        let mut b = Bindings::new();
        assert!(match_type(&Type::Value, &Type::Number, &mut b).is_ok());
        assert!(match_type(&Type::Value, &Type::array_n(Type::String, 3), &mut b).is_ok());
    }

    #[test]
    fn primitives_must_match() {
        let mut b = Bindings::new();
        assert!(match_type(&Type::Number, &Type::Number, &mut b).is_ok());
        let err = match_type(&Type::Number, &Type::String, &mut b).unwrap_err();
        assert!(err.contains("Expected Number but found String"));
    }

    #[test]
    fn typename_binds_then_constrains() {
        let mut b = Bindings::new();
        assert!(match_type(&Type::Typename("T"), &Type::Number, &mut b).is_ok());
        assert_eq!(b.get("T"), Some(&Type::Number));
        assert!(match_type(&Type::Typename("T"), &Type::Number, &mut b).is_ok());
        assert!(match_type(&Type::Typename("T"), &Type::String, &mut b).is_err());
    }

    #[test]
    fn typename_on_actual_side_solves() {
        let mut b = Bindings::new();
        assert!(match_type(&Type::Number, &Type::Typename("T"), &mut b).is_ok());
        assert_eq!(b.get("T"), Some(&Type::Number));
    }

    #[test]
    fn array_length_rules() {
        let mut b = Bindings::new();
        // Unspecified expected length matches any length.
        assert!(match_type(
            &Type::array(Type::Number),
            &Type::array_n(Type::Number, 7),
            &mut b
        )
        .is_ok());
        // Specified expected length must be equal.
        assert!(match_type(
            &Type::array_n(Type::Number, 4),
            &Type::array_n(Type::Number, 3),
            &mut b
        )
        .is_err());
    }

    #[test]
    fn array_item_typename_binds() {
        let mut b = Bindings::new();
        assert!(match_type(
            &Type::array(Type::Typename("T")),
            &Type::array_n(Type::Number, 2),
            &mut b
        )
        .is_ok());
        assert_eq!(b.get("T"), Some(&Type::Number));
    }

    #[test]
    fn variant_takes_first_matching_member() {
        let mut b = Bindings::new();
        let variant = Type::Variant(vec![Type::array(Type::Value), Type::String]);
        assert!(match_type(&variant, &Type::String, &mut b).is_ok());
        assert!(match_type(&variant, &Type::array_n(Type::Number, 2), &mut b).is_ok());
        assert!(match_type(&variant, &Type::Boolean, &mut b).is_err());
    }

    #[test]
    fn variant_failure_does_not_leak_bindings() {
        let mut b = Bindings::new();
        let variant = Type::Variant(vec![Type::array(Type::Typename("T")), Type::String]);
        assert!(match_type(&variant, &Type::String, &mut b).is_ok());
        assert!(!b.contains_key("T"));
    }

    #[test]
    fn substitute_replaces_bound_names() {
        let mut b = Bindings::new();
        b.insert("T", Type::Color);
        let sig = lambda(
            Type::Typename("T"),
            vec![Type::Number, Type::array(Type::Typename("T"))],
        );
        let specialized = substitute(&Type::Lambda(Box::new(sig)), &b);
        match specialized {
            Type::Lambda(l) => {
                assert_eq!(l.result, Type::Color);
                assert_eq!(l.params[1], Type::array(Type::Color));
            }
            other => panic!("expected lambda, got {other:?}"),
        }
    }

    #[test]
    fn display_renderings() {
        assert_eq!(Type::array_n(Type::Number, 4).to_string(), "Array<Number, 4>");
        assert_eq!(Type::array(Type::Value).to_string(), "Array<Value>");
        assert_eq!(Type::Color.to_string(), "Color");
        assert_eq!(
            lambda(Type::Number, vec![Type::Number, Type::Number]).to_string(),
            "(Number, Number) => Number"
        );
        assert_eq!(
            Type::Variant(vec![Type::array(Type::Value), Type::String]).to_string(),
            "Array<Value> | String"
        );
    }

    #[test]
    fn unresolved_typename_is_found_nested() {
        assert_eq!(
            unresolved_typename(&Type::array(Type::Typename("U"))),
            Some("U")
        );
        assert_eq!(unresolved_typename(&Type::Number), None);
    }
}
