//! Constraint tree types and their JSON wire form

use serde::{Deserialize, Serialize};

/// A declarative, side-effect-free predicate over a snapshot.
///
/// Trees are built per request, validated, evaluated, and discarded; only
/// their hash survives in the ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    /// Compare one snapshot field to a fixed value.
    Atomic {
        field: String,
        operator: CompareOp,
        #[serde(default)]
        value: serde_json::Value,
        /// Audit metadata only; carried into the trace, never changes the
        /// comparison semantics.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<String>,
    },

    /// Boolean combination of child constraints. AND and OR short-circuit
    /// left to right; NOT takes exactly one child.
    Composite {
        op: BooleanOp,
        children: Vec<Constraint>,
    },

    /// Evaluate `then` if `condition` passes, otherwise `otherwise`
    /// (pass when absent).
    Conditional {
        condition: Box<Constraint>,
        then: Box<Constraint>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<Constraint>>,
    },

    /// Compare the quotient of two snapshot fields to a threshold.
    /// A zero denominator makes the outcome undefined.
    Ratio {
        numerator_field: String,
        denominator_field: String,
        operator: CompareOp,
        threshold: f64,
    },

    /// Aggregate a caller-supplied timestamped series over a window and
    /// compare the aggregate to a value. The window is anchored at the
    /// newest observation, keeping evaluation clock-free.
    Aggregated {
        field: String,
        aggregate: Aggregate,
        /// Window length in seconds, capped at one year.
        window_secs: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_by: Option<String>,
        operator: CompareOp,
        value: f64,
    },
}

/// Comparison operators for atomic constraints.
///
/// `Matches` is substring/`*`-wildcard matching; `In` tests membership in a
/// fixed set; `Exists`/`Empty` consult presence and emptiness and ignore
/// the comparison value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
    Matches,
    In,
    Exists,
    Empty,
}

impl CompareOp {
    /// Operators that order two numbers; the only ones meaningful for
    /// ratio and aggregated comparisons.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            CompareOp::Eq | CompareOp::Ne | CompareOp::Lt | CompareOp::Gt | CompareOp::Le | CompareOp::Ge
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "lt",
            CompareOp::Gt => "gt",
            CompareOp::Le => "le",
            CompareOp::Ge => "ge",
            CompareOp::Contains => "contains",
            CompareOp::Matches => "matches",
            CompareOp::In => "in",
            CompareOp::Exists => "exists",
            CompareOp::Empty => "empty",
        }
    }
}

/// Boolean combinators for composite constraints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanOp {
    And,
    Or,
    Not,
}

/// Aggregation functions for series constraints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Sum,
    Count,
    Avg,
}
