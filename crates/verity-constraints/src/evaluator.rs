//! Three-valued constraint evaluation
//!
//! `evaluate_constraint` is a pure function of (constraint, snapshot).
//! Children are evaluated left to right; AND short-circuits on the first
//! failing child and OR on the first passing child, and the trace records
//! only the children actually visited. The only source of `Undefined` is a
//! ratio with a zero denominator; it propagates through composites and is
//! never collapsed here.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constraint::{Aggregate, BooleanOp, CompareOp, Constraint};
use crate::snapshot::Snapshot;

/// Exactly one of these per evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Undefined,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        matches!(self, Outcome::Pass)
    }

    fn from_bool(passed: bool) -> Self {
        if passed {
            Outcome::Pass
        } else {
            Outcome::Fail
        }
    }
}

/// One visited node in the evaluation trace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceStep {
    /// Short description of the node, e.g. `atomic:amount lt`.
    pub node: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Audit domain carried from atomic constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// The evaluation result: outcome plus the visited-node trace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: Outcome,
    pub trace: Vec<TraceStep>,
}

/// Evaluate a validated constraint tree against a snapshot.
pub fn evaluate_constraint(constraint: &Constraint, snapshot: &Snapshot) -> Verdict {
    let mut trace = Vec::new();
    let outcome = eval_node(constraint, snapshot, &mut trace);
    debug!(?outcome, visited = trace.len(), "constraint evaluated");
    Verdict { outcome, trace }
}

fn eval_node(constraint: &Constraint, snapshot: &Snapshot, trace: &mut Vec<TraceStep>) -> Outcome {
    match constraint {
        Constraint::Atomic {
            field,
            operator,
            value,
            domain,
        } => {
            let (outcome, detail) = eval_atomic(field, *operator, value, snapshot);
            trace.push(TraceStep {
                node: format!("atomic:{field} {}", operator.name()),
                outcome,
                detail,
                domain: domain.clone(),
            });
            outcome
        }

        Constraint::Composite { op, children } => {
            let outcome = match op {
                BooleanOp::And => {
                    let mut saw_undefined = false;
                    let mut result = Outcome::Pass;
                    for child in children {
                        match eval_node(child, snapshot, trace) {
                            Outcome::Fail => {
                                result = Outcome::Fail;
                                break;
                            }
                            Outcome::Undefined => saw_undefined = true,
                            Outcome::Pass => {}
                        }
                    }
                    if result == Outcome::Pass && saw_undefined {
                        Outcome::Undefined
                    } else {
                        result
                    }
                }
                BooleanOp::Or => {
                    let mut saw_undefined = false;
                    let mut result = Outcome::Fail;
                    for child in children {
                        match eval_node(child, snapshot, trace) {
                            Outcome::Pass => {
                                result = Outcome::Pass;
                                break;
                            }
                            Outcome::Undefined => saw_undefined = true,
                            Outcome::Fail => {}
                        }
                    }
                    if result == Outcome::Fail && saw_undefined {
                        Outcome::Undefined
                    } else {
                        result
                    }
                }
                // The validator enforces exactly one child; an unvalidated
                // empty NOT fails closed.
                BooleanOp::Not => match children.first() {
                    Some(child) => match eval_node(child, snapshot, trace) {
                        Outcome::Pass => Outcome::Fail,
                        Outcome::Fail => Outcome::Pass,
                        Outcome::Undefined => Outcome::Undefined,
                    },
                    None => Outcome::Fail,
                },
            };
            trace.push(TraceStep {
                node: format!("composite:{op:?}").to_lowercase(),
                outcome,
                detail: None,
                domain: None,
            });
            outcome
        }

        Constraint::Conditional {
            condition,
            then,
            otherwise,
        } => {
            // A condition that does not pass (fail or undefined) selects
            // the else branch; an absent else branch passes.
            let outcome = if eval_node(condition, snapshot, trace).passed() {
                eval_node(then, snapshot, trace)
            } else {
                match otherwise {
                    Some(otherwise) => eval_node(otherwise, snapshot, trace),
                    None => Outcome::Pass,
                }
            };
            trace.push(TraceStep {
                node: "conditional".into(),
                outcome,
                detail: None,
                domain: None,
            });
            outcome
        }

        Constraint::Ratio {
            numerator_field,
            denominator_field,
            operator,
            threshold,
        } => {
            let (outcome, detail) = eval_ratio(
                numerator_field,
                denominator_field,
                *operator,
                *threshold,
                snapshot,
            );
            trace.push(TraceStep {
                node: format!("ratio:{numerator_field}/{denominator_field}"),
                outcome,
                detail,
                domain: None,
            });
            outcome
        }

        Constraint::Aggregated {
            field,
            aggregate,
            window_secs,
            group_by,
            operator,
            value,
        } => {
            let (outcome, detail) = eval_aggregated(
                field,
                *aggregate,
                *window_secs,
                group_by.as_deref(),
                *operator,
                *value,
                snapshot,
            );
            trace.push(TraceStep {
                node: format!("aggregated:{field} {aggregate:?}").to_lowercase(),
                outcome,
                detail,
                domain: None,
            });
            outcome
        }
    }
}

fn eval_atomic(
    field: &str,
    operator: CompareOp,
    expected: &serde_json::Value,
    snapshot: &Snapshot,
) -> (Outcome, Option<String>) {
    let actual = snapshot.field(field);

    // A missing field fails the constraint; it is not an error.
    let Some(actual) = actual else {
        let outcome = Outcome::Fail;
        return (outcome, Some(format!("field {field} not present")));
    };

    let passed = match operator {
        CompareOp::Eq => json_equal(actual, expected),
        CompareOp::Ne => !json_equal(actual, expected),
        CompareOp::Lt | CompareOp::Gt | CompareOp::Le | CompareOp::Ge => {
            match json_order(actual, expected) {
                Some(ordering) => match operator {
                    CompareOp::Lt => ordering.is_lt(),
                    CompareOp::Gt => ordering.is_gt(),
                    CompareOp::Le => ordering.is_le(),
                    CompareOp::Ge => ordering.is_ge(),
                    _ => unreachable!("only ordering operators reach here"),
                },
                None => false,
            }
        }
        CompareOp::Contains => match (actual, expected) {
            (serde_json::Value::String(haystack), serde_json::Value::String(needle)) => {
                haystack.contains(needle.as_str())
            }
            (serde_json::Value::Array(items), needle) => {
                items.iter().any(|item| json_equal(item, needle))
            }
            _ => false,
        },
        CompareOp::Matches => match (actual, expected) {
            (serde_json::Value::String(text), serde_json::Value::String(pattern)) => {
                wildcard_match(text, pattern)
            }
            _ => false,
        },
        CompareOp::In => match expected {
            serde_json::Value::Array(allowed) => {
                allowed.iter().any(|item| json_equal(actual, item))
            }
            _ => false,
        },
        CompareOp::Exists => true,
        CompareOp::Empty => match actual {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            _ => false,
        },
    };

    (Outcome::from_bool(passed), None)
}

fn eval_ratio(
    numerator_field: &str,
    denominator_field: &str,
    operator: CompareOp,
    threshold: f64,
    snapshot: &Snapshot,
) -> (Outcome, Option<String>) {
    let Some(numerator) = snapshot.numeric_field(numerator_field) else {
        return (
            Outcome::Fail,
            Some(format!("field {numerator_field} not numeric or missing")),
        );
    };
    let Some(denominator) = snapshot.numeric_field(denominator_field) else {
        return (
            Outcome::Fail,
            Some(format!("field {denominator_field} not numeric or missing")),
        );
    };

    if denominator == 0.0 {
        return (Outcome::Undefined, Some("denominator is zero".into()));
    }

    let ratio = numerator / denominator;
    (
        Outcome::from_bool(compare_numbers(ratio, operator, threshold)),
        Some(format!("ratio={ratio}")),
    )
}

fn eval_aggregated(
    field: &str,
    aggregate: Aggregate,
    window_secs: i64,
    group_by: Option<&str>,
    operator: CompareOp,
    value: f64,
    snapshot: &Snapshot,
) -> (Outcome, Option<String>) {
    let Some(series) = snapshot.series.get(field) else {
        return (Outcome::Fail, Some(format!("series {field} not present")));
    };

    // Anchor the window at the newest observation so evaluation never
    // reads the wall clock.
    let Some(newest) = series.iter().map(|o| o.at).max() else {
        return (Outcome::Fail, Some("series is empty".into()));
    };
    let cutoff = newest - Duration::seconds(window_secs);

    let kept: Vec<f64> = series
        .iter()
        .filter(|o| o.at >= cutoff)
        .filter(|o| match group_by {
            Some(group) => o.group.as_deref() == Some(group),
            None => true,
        })
        .map(|o| o.value)
        .collect();

    let aggregated = match aggregate {
        Aggregate::Count => kept.len() as f64,
        Aggregate::Sum => {
            if kept.is_empty() {
                return (Outcome::Fail, Some("no observations in window".into()));
            }
            kept.iter().sum()
        }
        Aggregate::Avg => {
            if kept.is_empty() {
                return (Outcome::Fail, Some("no observations in window".into()));
            }
            kept.iter().sum::<f64>() / kept.len() as f64
        }
    };

    (
        Outcome::from_bool(compare_numbers(aggregated, operator, value)),
        Some(format!("{aggregate:?}={aggregated}").to_lowercase()),
    )
}

fn compare_numbers(left: f64, operator: CompareOp, right: f64) -> bool {
    match operator {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        CompareOp::Lt => left < right,
        CompareOp::Gt => left > right,
        CompareOp::Le => left <= right,
        CompareOp::Ge => left >= right,
        // The validator rejects non-ordering operators in numeric positions.
        _ => false,
    }
}

/// Number-aware JSON equality: `500` and `500.0` are equal.
fn json_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn json_order(a: &serde_json::Value, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (serde_json::Value::String(x), serde_json::Value::String(y)) = (a, b) {
        return Some(x.cmp(y));
    }
    None
}

/// Substring/wildcard matching: `*` matches any run of characters. A
/// pattern without `*` must match the whole string.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return text == pattern;
    }
    let mut remainder = text;
    let segments: Vec<&str> = pattern.split('*').collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            // Anchored prefix.
            match remainder.strip_prefix(segment) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            // Anchored suffix.
            return remainder.ends_with(segment);
        } else {
            match remainder.find(segment) {
                Some(pos) => remainder = &remainder[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Observation;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn atomic(field: &str, operator: CompareOp, value: serde_json::Value) -> Constraint {
        Constraint::Atomic {
            field: field.into(),
            operator,
            value,
            domain: None,
        }
    }

    #[test]
    fn composite_and_over_snapshot() {
        // amount < 1000 AND category != "blocked"
        let constraint = Constraint::Composite {
            op: BooleanOp::And,
            children: vec![
                atomic("amount", CompareOp::Lt, json!(1000)),
                atomic("category", CompareOp::Ne, json!("blocked")),
            ],
        };
        let snapshot = Snapshot::new()
            .with_field("amount", json!(500))
            .with_field("category", json!("approved"));
        let verdict = evaluate_constraint(&constraint, &snapshot);
        assert_eq!(verdict.outcome, Outcome::Pass);
    }

    #[test]
    fn and_short_circuits_and_trace_shows_only_visited() {
        let constraint = Constraint::Composite {
            op: BooleanOp::And,
            children: vec![
                atomic("a", CompareOp::Eq, json!(1)),
                atomic("b", CompareOp::Eq, json!(1)),
                atomic("c", CompareOp::Eq, json!(1)),
            ],
        };
        let snapshot = Snapshot::new()
            .with_field("a", json!(2)) // first child fails
            .with_field("b", json!(1))
            .with_field("c", json!(1));
        let verdict = evaluate_constraint(&constraint, &snapshot);
        assert_eq!(verdict.outcome, Outcome::Fail);
        // One atomic step plus the composite itself; b and c never visited.
        let atomic_steps: Vec<_> = verdict
            .trace
            .iter()
            .filter(|s| s.node.starts_with("atomic:"))
            .collect();
        assert_eq!(atomic_steps.len(), 1);
        assert!(atomic_steps[0].node.contains('a'));
    }

    #[test]
    fn or_short_circuits_on_first_pass() {
        let constraint = Constraint::Composite {
            op: BooleanOp::Or,
            children: vec![
                atomic("x", CompareOp::Eq, json!(1)),
                atomic("y", CompareOp::Eq, json!(1)),
            ],
        };
        let snapshot = Snapshot::new()
            .with_field("x", json!(1))
            .with_field("y", json!(0));
        let verdict = evaluate_constraint(&constraint, &snapshot);
        assert_eq!(verdict.outcome, Outcome::Pass);
        let atomic_steps = verdict
            .trace
            .iter()
            .filter(|s| s.node.starts_with("atomic:"))
            .count();
        assert_eq!(atomic_steps, 1);
    }

    #[test]
    fn missing_field_fails_without_error() {
        let constraint = atomic("absent", CompareOp::Eq, json!(1));
        let verdict = evaluate_constraint(&constraint, &Snapshot::new());
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert!(verdict.trace[0].detail.as_deref().unwrap().contains("not present"));
    }

    #[test]
    fn ratio_with_zero_denominator_is_undefined() {
        let constraint = Constraint::Ratio {
            numerator_field: "f".into(),
            denominator_field: "g".into(),
            operator: CompareOp::Le,
            threshold: 1.0,
        };
        let snapshot = Snapshot::new()
            .with_field("f", json!(100))
            .with_field("g", json!(0));
        let verdict = evaluate_constraint(&constraint, &snapshot);
        assert_eq!(verdict.outcome, Outcome::Undefined);
        assert_ne!(verdict.outcome, Outcome::Pass);
        assert_ne!(verdict.outcome, Outcome::Fail);
    }

    #[test]
    fn ratio_compares_quotient_to_threshold() {
        let constraint = Constraint::Ratio {
            numerator_field: "errors".into(),
            denominator_field: "requests".into(),
            operator: CompareOp::Le,
            threshold: 0.01,
        };
        let snapshot = Snapshot::new()
            .with_field("errors", json!(5))
            .with_field("requests", json!(1000));
        assert_eq!(
            evaluate_constraint(&constraint, &snapshot).outcome,
            Outcome::Pass
        );
        let snapshot = Snapshot::new()
            .with_field("errors", json!(50))
            .with_field("requests", json!(1000));
        assert_eq!(
            evaluate_constraint(&constraint, &snapshot).outcome,
            Outcome::Fail
        );
    }

    #[test]
    fn undefined_propagates_through_composites() {
        let undefined_ratio = Constraint::Ratio {
            numerator_field: "f".into(),
            denominator_field: "g".into(),
            operator: CompareOp::Le,
            threshold: 1.0,
        };
        let snapshot = Snapshot::new()
            .with_field("f", json!(1))
            .with_field("g", json!(0))
            .with_field("ok", json!(true));

        let and = Constraint::Composite {
            op: BooleanOp::And,
            children: vec![
                atomic("ok", CompareOp::Eq, json!(true)),
                undefined_ratio.clone(),
            ],
        };
        assert_eq!(evaluate_constraint(&and, &snapshot).outcome, Outcome::Undefined);

        let not = Constraint::Composite {
            op: BooleanOp::Not,
            children: vec![undefined_ratio],
        };
        assert_eq!(evaluate_constraint(&not, &snapshot).outcome, Outcome::Undefined);
    }

    #[test]
    fn and_still_fails_when_a_later_child_fails_after_undefined() {
        let undefined_ratio = Constraint::Ratio {
            numerator_field: "f".into(),
            denominator_field: "g".into(),
            operator: CompareOp::Le,
            threshold: 1.0,
        };
        let and = Constraint::Composite {
            op: BooleanOp::And,
            children: vec![
                undefined_ratio,
                atomic("ok", CompareOp::Eq, json!(true)),
            ],
        };
        let snapshot = Snapshot::new()
            .with_field("f", json!(1))
            .with_field("g", json!(0))
            .with_field("ok", json!(false));
        assert_eq!(evaluate_constraint(&and, &snapshot).outcome, Outcome::Fail);
    }

    #[test]
    fn conditional_defaults_to_pass_without_else() {
        let constraint = Constraint::Conditional {
            condition: Box::new(atomic("tier", CompareOp::Eq, json!("pro"))),
            then: Box::new(atomic("quota", CompareOp::Gt, json!(0))),
            otherwise: None,
        };
        // Condition fails, no else: pass.
        let snapshot = Snapshot::new().with_field("tier", json!("free"));
        assert_eq!(
            evaluate_constraint(&constraint, &snapshot).outcome,
            Outcome::Pass
        );
        // Condition passes, then fails.
        let snapshot = Snapshot::new()
            .with_field("tier", json!("pro"))
            .with_field("quota", json!(0));
        assert_eq!(
            evaluate_constraint(&constraint, &snapshot).outcome,
            Outcome::Fail
        );
    }

    #[test]
    fn aggregated_window_is_anchored_at_newest_observation() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let series = vec![
            Observation::new(base, 10.0),
            Observation::new(base + Duration::days(5), 20.0),
            Observation::new(base + Duration::days(10), 30.0),
        ];
        // A two-day window keeps only the newest observation.
        let constraint = Constraint::Aggregated {
            field: "spend".into(),
            aggregate: Aggregate::Sum,
            window_secs: 2 * 24 * 60 * 60,
            group_by: None,
            operator: CompareOp::Eq,
            value: 30.0,
        };
        let snapshot = Snapshot::new().with_series("spend", series);
        assert_eq!(
            evaluate_constraint(&constraint, &snapshot).outcome,
            Outcome::Pass
        );
    }

    #[test]
    fn aggregated_group_filter_and_count() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let series = vec![
            Observation::grouped(base, "eu", 1.0),
            Observation::grouped(base, "us", 1.0),
            Observation::grouped(base, "eu", 1.0),
        ];
        let constraint = Constraint::Aggregated {
            field: "logins".into(),
            aggregate: Aggregate::Count,
            window_secs: 3600,
            group_by: Some("eu".into()),
            operator: CompareOp::Eq,
            value: 2.0,
        };
        let snapshot = Snapshot::new().with_series("logins", series);
        assert_eq!(
            evaluate_constraint(&constraint, &snapshot).outcome,
            Outcome::Pass
        );
    }

    #[test]
    fn contains_matches_in_and_empty_operators() {
        let snapshot = Snapshot::new()
            .with_field("tags", json!(["alpha", "beta"]))
            .with_field("name", json!("payment-service"))
            .with_field("note", json!(""));

        assert_eq!(
            evaluate_constraint(&atomic("tags", CompareOp::Contains, json!("beta")), &snapshot)
                .outcome,
            Outcome::Pass
        );
        assert_eq!(
            evaluate_constraint(
                &atomic("name", CompareOp::Matches, json!("payment-*")),
                &snapshot
            )
            .outcome,
            Outcome::Pass
        );
        assert_eq!(
            evaluate_constraint(
                &atomic("name", CompareOp::In, json!(["ledger", "payment-service"])),
                &snapshot
            )
            .outcome,
            Outcome::Pass
        );
        assert_eq!(
            evaluate_constraint(&atomic("note", CompareOp::Empty, json!(null)), &snapshot).outcome,
            Outcome::Pass
        );
        assert_eq!(
            evaluate_constraint(&atomic("name", CompareOp::Exists, json!(null)), &snapshot)
                .outcome,
            Outcome::Pass
        );
    }

    #[test]
    fn wildcard_matching_rules() {
        assert!(wildcard_match("abc", "abc"));
        assert!(!wildcard_match("abc", "ab"));
        assert!(wildcard_match("abcdef", "ab*ef"));
        assert!(wildcard_match("abcdef", "*cd*"));
        assert!(!wildcard_match("abcdef", "ab*xy"));
        assert!(wildcard_match("anything", "*"));
    }
}
