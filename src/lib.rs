//! Compiler for a declarative, JSON-shaped expression language used for
//! data-driven styling of map features.
//!
//! The input is a tree of nested arrays whose head names an operator and
//! whose tail holds operand expressions (scalars and `null` are literals;
//! `["literal", ...]` quotes arbitrary arrays and objects). Compilation runs
//! parse → type check → compile and yields an evaluator callable against a
//! map-properties bag and a feature, plus two flags telling whether the
//! result is invariant under feature and zoom changes.
//!
//! ```
//! use style_expr::{compile, Globals};
//! use serde_json::json;
//!
//! let compiled = compile(&json!(["+", 2, 3, 4]), None).unwrap();
//! assert!(compiled.is_feature_constant());
//! let value = compiled.evaluate(&Globals::default(), None).unwrap();
//! assert_eq!(value.as_number(), Some(9.0));
//! ```

#![allow(
    clippy::indexing_slicing,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value
)]

pub mod ast;
pub mod builtins;
pub mod color;
pub mod compiler;
pub mod curve;
pub mod error;
pub mod match_op;
pub mod parser;
pub mod typeck;
pub mod types;
pub mod value;
pub mod vm;

use std::sync::LazyLock;

pub use builtins::Registry;
pub use color::Color;
pub use compiler::CompiledExpression;
pub use error::{CompileError, ErrorKind, EvalError};
pub use types::Type;
pub use value::{Feature, Globals, Value};

use parser::ParsingContext;

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Compile a raw expression against the default operator registry.
///
/// `expected` constrains the result type; `None` accepts any result. On
/// failure, every diagnostic carries the dotted path of the offending
/// sub-expression in the raw input.
pub fn compile(
    expr: &serde_json::Value,
    expected: Option<&Type>,
) -> Result<CompiledExpression, Vec<CompileError>> {
    compile_with(&REGISTRY, expr, expected)
}

/// Compile against an explicit registry. The registry is only read; separate
/// compilations may share one freely across threads.
pub fn compile_with(
    registry: &Registry,
    expr: &serde_json::Value,
    expected: Option<&Type>,
) -> Result<CompiledExpression, Vec<CompileError>> {
    let parsed = parser::parse(expr, &ParsingContext::new(registry)).map_err(|e| vec![e])?;
    let checked = typeck::check(expected.unwrap_or(&Type::Value), &parsed)?;
    compiler::compile_checked(&checked, registry)
}
