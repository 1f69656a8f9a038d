//! Read-only data snapshots
//!
//! A snapshot is the complete world a constraint tree is evaluated
//! against: scalar fields for atomic/ratio constraints and timestamped
//! series for aggregated constraints. Historical storage is the caller's
//! responsibility; the evaluator never fetches anything.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped observation in a series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub value: f64,
}

impl Observation {
    pub fn new(at: DateTime<Utc>, value: f64) -> Self {
        Self {
            at,
            group: None,
            value,
        }
    }

    pub fn grouped(at: DateTime<Utc>, group: impl Into<String>, value: f64) -> Self {
        Self {
            at,
            group: Some(group.into()),
            value,
        }
    }
}

/// Caller-supplied evaluation input.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub series: BTreeMap<String, Vec<Observation>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_series(
        mut self,
        name: impl Into<String>,
        observations: Vec<Observation>,
    ) -> Self {
        self.series.insert(name.into(), observations);
        self
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// A field's numeric value, if present and numeric.
    pub fn numeric_field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(|v| v.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_collects_fields_and_series() {
        let snapshot = Snapshot::new()
            .with_field("amount", json!(500))
            .with_series("logins", vec![Observation::new(Utc::now(), 1.0)]);
        assert_eq!(snapshot.numeric_field("amount"), Some(500.0));
        assert_eq!(snapshot.series["logins"].len(), 1);
    }

    #[test]
    fn numeric_field_rejects_non_numbers() {
        let snapshot = Snapshot::new().with_field("category", json!("blocked"));
        assert_eq!(snapshot.numeric_field("category"), None);
        assert_eq!(snapshot.numeric_field("missing"), None);
    }
}
