//! Verity constraint evaluator
//!
//! Evaluates declarative predicate trees against a read-only data snapshot
//! with a three-valued outcome: pass, fail, or undefined. Undefined exists
//! for exactly one reason, a ratio constraint whose denominator is zero,
//! and is never silently coerced to pass or fail.
//!
//! A static pre-pass ([`validate`]) rejects pathological trees (excessive
//! nesting, over-long aggregation windows) before evaluation begins, so
//! termination does not rest on runtime bounds.

#![deny(unsafe_code)]

mod constraint;
mod error;
mod evaluator;
mod snapshot;
mod validator;

pub use constraint::{Aggregate, BooleanOp, CompareOp, Constraint};
pub use error::ConstraintError;
pub use evaluator::{evaluate_constraint, Outcome, TraceStep, Verdict};
pub use snapshot::{Observation, Snapshot};
pub use validator::{validate, MAX_NESTING_DEPTH, MAX_WINDOW_SECS};
