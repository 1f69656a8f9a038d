//! Execution budgets and per-call metering
//!
//! A budget is a read-only input; the meter is the private mutable counter
//! struct owned by exactly one evaluation call. Counters are monotonic
//! within a call and never shared across calls, so concurrent evaluations
//! cannot corrupt each other's bounds.

use std::time::{Duration, Instant};

use crate::error::{BoundKind, EvalError};

/// Documented defaults applied when the caller omits a bound.
pub const DEFAULT_MAX_ITERATIONS: u64 = 10_000;
pub const DEFAULT_MAX_OPERATIONS: u64 = 1_000_000;
pub const DEFAULT_MAX_RECURSION_DEPTH: u32 = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Hard platform maxima; caller-requested bounds are clamped down to these.
pub const HARD_MAX_ITERATIONS: u64 = 100_000;
pub const HARD_MAX_OPERATIONS: u64 = 10_000_000;
pub const HARD_MAX_RECURSION_DEPTH: u32 = 1_000;
pub const HARD_MAX_TIMEOUT: Duration = Duration::from_secs(60);

/// How many operations pass between deadline polls. Keeps a tight
/// non-yielding loop from starving the timeout check without paying for a
/// clock read on every node.
const TIMEOUT_POLL_INTERVAL: u64 = 1_024;

/// Hard resource ceilings for one evaluation call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionBudget {
    pub max_iterations: u64,
    pub max_operations: u64,
    pub max_recursion_depth: u32,
    pub timeout: Duration,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ExecutionBudget {
    /// Build a budget from caller-requested values.
    ///
    /// Omitted values take the documented defaults; supplied values are
    /// clamped down to the hard maxima, never raised.
    pub fn clamped(
        max_iterations: Option<u64>,
        max_operations: Option<u64>,
        max_recursion_depth: Option<u32>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            max_iterations: max_iterations
                .unwrap_or(DEFAULT_MAX_ITERATIONS)
                .min(HARD_MAX_ITERATIONS),
            max_operations: max_operations
                .unwrap_or(DEFAULT_MAX_OPERATIONS)
                .min(HARD_MAX_OPERATIONS),
            max_recursion_depth: max_recursion_depth
                .unwrap_or(DEFAULT_MAX_RECURSION_DEPTH)
                .min(HARD_MAX_RECURSION_DEPTH),
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT).min(HARD_MAX_TIMEOUT),
        }
    }
}

/// Resources consumed by one evaluation call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    pub operations: u64,
    pub iterations: u64,
    pub peak_recursion: u32,
}

/// Per-call counters. Owned exclusively by one `evaluate` invocation and
/// threaded through it by mutable reference.
pub(crate) struct BudgetMeter {
    budget: ExecutionBudget,
    operations: u64,
    iterations: u64,
    depth: u32,
    peak_depth: u32,
    deadline: Option<Instant>,
    ops_since_poll: u64,
}

impl BudgetMeter {
    /// Start metering. The deadline is captured once, here; evaluation
    /// itself never reads the wall clock for its result.
    pub fn new(budget: &ExecutionBudget) -> Self {
        Self {
            budget: *budget,
            operations: 0,
            iterations: 0,
            depth: 0,
            peak_depth: 0,
            deadline: Instant::now().checked_add(budget.timeout),
            ops_since_poll: 0,
        }
    }

    /// Charge one operator application.
    pub fn charge_operation(&mut self) -> Result<(), EvalError> {
        self.operations += 1;
        if self.operations > self.budget.max_operations {
            return Err(EvalError::BoundExceeded {
                kind: BoundKind::Operations,
            });
        }
        self.ops_since_poll += 1;
        if self.ops_since_poll >= TIMEOUT_POLL_INTERVAL {
            self.ops_since_poll = 0;
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(EvalError::BoundExceeded {
                        kind: BoundKind::Timeout,
                    });
                }
            }
        }
        Ok(())
    }

    /// Charge one loop iteration (for/while/map/filter/reduce element).
    pub fn charge_iteration(&mut self) -> Result<(), EvalError> {
        self.iterations += 1;
        if self.iterations > self.budget.max_iterations {
            return Err(EvalError::BoundExceeded {
                kind: BoundKind::Iterations,
            });
        }
        Ok(())
    }

    /// Enter a function application frame.
    pub fn enter_call(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > self.budget.max_recursion_depth {
            return Err(EvalError::BoundExceeded {
                kind: BoundKind::Recursion,
            });
        }
        if self.depth > self.peak_depth {
            self.peak_depth = self.depth;
        }
        Ok(())
    }

    /// Leave a function application frame.
    pub fn exit_call(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn usage(&self) -> Usage {
        Usage {
            operations: self.operations,
            iterations: self.iterations,
            peak_recursion: self.peak_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let budget = ExecutionBudget::default();
        assert_eq!(budget.max_iterations, 10_000);
        assert_eq!(budget.max_operations, 1_000_000);
        assert_eq!(budget.max_recursion_depth, 100);
        assert_eq!(budget.timeout, Duration::from_secs(30));
    }

    #[test]
    fn clamping_never_raises_above_hard_maxima() {
        let budget = ExecutionBudget::clamped(
            Some(u64::MAX),
            Some(u64::MAX),
            Some(u32::MAX),
            Some(Duration::from_secs(3_600)),
        );
        assert_eq!(budget.max_iterations, HARD_MAX_ITERATIONS);
        assert_eq!(budget.max_operations, HARD_MAX_OPERATIONS);
        assert_eq!(budget.max_recursion_depth, HARD_MAX_RECURSION_DEPTH);
        assert_eq!(budget.timeout, HARD_MAX_TIMEOUT);
    }

    #[test]
    fn clamping_keeps_lower_requests() {
        let budget = ExecutionBudget::clamped(Some(5), None, Some(3), None);
        assert_eq!(budget.max_iterations, 5);
        assert_eq!(budget.max_operations, DEFAULT_MAX_OPERATIONS);
        assert_eq!(budget.max_recursion_depth, 3);
        assert_eq!(budget.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn operation_ceiling_aborts() {
        let budget = ExecutionBudget {
            max_operations: 2,
            ..Default::default()
        };
        let mut meter = BudgetMeter::new(&budget);
        assert!(meter.charge_operation().is_ok());
        assert!(meter.charge_operation().is_ok());
        assert_eq!(
            meter.charge_operation(),
            Err(EvalError::BoundExceeded {
                kind: BoundKind::Operations
            })
        );
    }

    #[test]
    fn recursion_tracks_peak_not_current() {
        let budget = ExecutionBudget::default();
        let mut meter = BudgetMeter::new(&budget);
        meter.enter_call().unwrap();
        meter.enter_call().unwrap();
        meter.exit_call();
        meter.exit_call();
        meter.enter_call().unwrap();
        meter.exit_call();
        assert_eq!(meter.usage().peak_recursion, 2);
    }

    #[test]
    fn expired_deadline_reports_timeout_at_poll() {
        let budget = ExecutionBudget {
            timeout: Duration::ZERO,
            ..Default::default()
        };
        let mut meter = BudgetMeter::new(&budget);
        let mut saw_timeout = false;
        for _ in 0..=TIMEOUT_POLL_INTERVAL {
            if let Err(EvalError::BoundExceeded {
                kind: BoundKind::Timeout,
            }) = meter.charge_operation()
            {
                saw_timeout = true;
                break;
            }
        }
        assert!(saw_timeout, "deadline must surface within one poll interval");
    }
}
