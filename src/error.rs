use std::fmt;

use serde::Serialize;

/// A compilation error with the dotted path of the offending sub-expression.
///
/// `key` addresses the raw input: `""` is the root, `"1.2"` is element 2 of
/// element 1 of the root array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileError {
    pub key: String,
    pub message: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Parse,
    Type,
    Compile,
}

impl CompileError {
    pub fn parse(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            kind: ErrorKind::Parse,
        }
    }

    pub fn type_error(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            kind: ErrorKind::Type,
        }
    }

    pub fn compile(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            kind: ErrorKind::Compile,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.key, self.message)
        }
    }
}

impl std::error::Error for CompileError {}

/// A runtime failure raised while evaluating a compiled expression, e.g. a
/// failed type assertion or an out-of-range array access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}
