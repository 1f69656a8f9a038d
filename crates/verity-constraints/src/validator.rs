//! Static halt-checking pre-pass
//!
//! Rejects constraint trees that could not be proven cheap to evaluate:
//! composite nesting beyond a fixed ceiling, aggregation windows beyond one
//! year, non-sensical operators in numeric positions, and malformed NOT
//! nodes. Validation is a parse-time termination proof independent of any
//! runtime bound: an adversarial payload is refused before evaluation
//! begins.

use crate::constraint::{BooleanOp, Constraint};
use crate::error::ConstraintError;

/// Maximum composite/conditional nesting depth.
pub const MAX_NESTING_DEPTH: usize = 1_000;

/// Maximum aggregation window: one year, in seconds.
pub const MAX_WINDOW_SECS: i64 = 365 * 24 * 60 * 60;

/// Validate a constraint tree for bounded evaluation.
pub fn validate(constraint: &Constraint) -> Result<(), ConstraintError> {
    check_node(constraint, 0)
}

fn check_node(constraint: &Constraint, depth: usize) -> Result<(), ConstraintError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ConstraintError::NestingTooDeep {
            depth,
            max: MAX_NESTING_DEPTH,
        });
    }

    match constraint {
        Constraint::Atomic { .. } => Ok(()),

        Constraint::Composite { op, children } => {
            if children.is_empty() {
                return Err(ConstraintError::InvalidStructure(
                    "composite constraint with no children".into(),
                ));
            }
            if *op == BooleanOp::Not && children.len() != 1 {
                return Err(ConstraintError::InvalidStructure(format!(
                    "NOT takes exactly one child, got {}",
                    children.len()
                )));
            }
            for child in children {
                check_node(child, depth + 1)?;
            }
            Ok(())
        }

        Constraint::Conditional {
            condition,
            then,
            otherwise,
        } => {
            check_node(condition, depth + 1)?;
            check_node(then, depth + 1)?;
            if let Some(otherwise) = otherwise {
                check_node(otherwise, depth + 1)?;
            }
            Ok(())
        }

        Constraint::Ratio { operator, .. } => {
            if !operator.is_ordering() {
                return Err(ConstraintError::InvalidOperator {
                    operator: operator.name(),
                    position: "a ratio comparison",
                });
            }
            Ok(())
        }

        Constraint::Aggregated {
            window_secs,
            operator,
            ..
        } => {
            if *window_secs <= 0 {
                return Err(ConstraintError::InvalidStructure(
                    "aggregation window must be positive".into(),
                ));
            }
            if *window_secs > MAX_WINDOW_SECS {
                return Err(ConstraintError::WindowTooLong {
                    secs: *window_secs,
                    max: MAX_WINDOW_SECS,
                });
            }
            if !operator.is_ordering() {
                return Err(ConstraintError::InvalidOperator {
                    operator: operator.name(),
                    position: "an aggregate comparison",
                });
            }
            Ok(())
        }
    }
}
