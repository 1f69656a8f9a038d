//! Constraint validation errors
//!
//! These are structural rejections raised by the static pre-pass, before
//! any evaluation happens. Evaluation itself does not error: its result is
//! always one of pass/fail/undefined.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConstraintError {
    #[error("Constraint nesting depth {depth} exceeds maximum {max}")]
    NestingTooDeep { depth: usize, max: usize },

    #[error("Aggregation window of {secs}s exceeds maximum {max}s")]
    WindowTooLong { secs: i64, max: i64 },

    #[error("Operator {operator} is not valid for {position}")]
    InvalidOperator {
        operator: &'static str,
        position: &'static str,
    },

    #[error("Invalid constraint structure: {0}")]
    InvalidStructure(String),
}
