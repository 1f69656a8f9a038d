//! Verity bounded interpreter
//!
//! Evaluates expression trees to values under strict per-call resource
//! ceilings. Every evaluation terminates: operations, loop iterations,
//! recursion depth and elapsed time are all metered, and the first ceiling
//! hit aborts the call with a [`EvalError::BoundExceeded`]. Evaluation is a
//! pure function of (expression, initial environment): no clock reads, no
//! randomness, no I/O.
//!
//! The instruction set is a closed enum ([`OpCode`]) dispatched by one
//! exhaustive match, which keeps the operator surface auditable and the
//! termination argument local to this crate.

#![deny(unsafe_code)]

mod budget;
mod env;
mod error;
mod eval;
mod expr;
mod value;

pub use budget::{ExecutionBudget, Usage};
pub use env::Environment;
pub use error::{BoundKind, EvalError};
pub use eval::evaluate;
pub use expr::{parse_expr, Expr, OpCode};
pub use value::{Lambda, Value};
