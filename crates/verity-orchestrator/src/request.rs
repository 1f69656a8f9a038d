//! Request and response wire types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use verity_constraints::{Constraint, Snapshot};
use verity_interpreter::ExecutionBudget;

/// Caller-requested resource bounds. Omitted fields take the documented
/// defaults; supplied values are clamped down to the hard maxima.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RequestedBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_operations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_recursion_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl RequestedBounds {
    /// Resolve to an enforceable budget. Clamping only ever lowers.
    pub fn to_budget(&self) -> ExecutionBudget {
        ExecutionBudget::clamped(
            self.max_iterations,
            self.max_operations,
            self.max_recursion_depth,
            self.timeout_seconds.map(Duration::from_secs),
        )
    }
}

/// One unit of work: an expression, an optional constraint gate with its
/// snapshot, and optional bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Expression tree in JSON wire form (`{"op": ..., "args": [...]}`).
    pub expression: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<RequestedBounds>,
}

impl EvaluationRequest {
    pub fn expression(expression: serde_json::Value) -> Self {
        Self {
            expression,
            constraints: None,
            snapshot: None,
            bounds: None,
        }
    }
}

/// What the caller gets back. Every request gets a response and a ledger
/// entry, refusals included.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationResponse {
    /// JSON rendering of the computed value; `null` when not verified.
    pub result: serde_json::Value,
    pub verified: bool,
    /// Machine-readable failure code when `verified` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub operations_used: u64,
    pub iterations_used: u64,
    pub recursion_depth_used: u32,
    pub elapsed_ms: u64,
    /// BLAKE3 over the canonical (request, result) pair; doubles as the
    /// idempotency key.
    pub fingerprint: String,
    pub ledger_index: u64,
    pub merkle_root: String,
}
