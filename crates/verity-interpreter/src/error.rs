//! Interpreter error taxonomy
//!
//! All variants are terminal for the evaluation that raised them: the
//! interpreter never substitutes a default value for a failed subtree.

use std::fmt;
use thiserror::Error;

/// Which resource ceiling was hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundKind {
    Iterations,
    Operations,
    Recursion,
    Timeout,
}

impl fmt::Display for BoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoundKind::Iterations => "iterations",
            BoundKind::Operations => "operations",
            BoundKind::Recursion => "recursion",
            BoundKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Evaluation errors
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("Execution bound exceeded: {kind}")]
    BoundExceeded { kind: BoundKind },

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Unknown identifier: {name}")]
    UnknownIdentifier { name: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Malformed expression: {0}")]
    Malformed(String),
}

impl EvalError {
    pub fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Stable machine-readable code for responses and ledger summaries.
    pub fn code(&self) -> String {
        match self {
            EvalError::BoundExceeded { kind } => format!("bound_exceeded:{kind}"),
            EvalError::TypeMismatch { .. } => "type_mismatch".to_string(),
            EvalError::UnknownIdentifier { .. } => "unknown_identifier".to_string(),
            EvalError::DivisionByZero => "division_by_zero".to_string(),
            EvalError::Malformed(_) => "malformed_expression".to_string(),
        }
    }
}
