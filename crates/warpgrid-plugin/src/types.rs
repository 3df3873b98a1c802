//! Domain types shared by every stage of a plugin run.
//!
//! Graph and metric definitions are declared once per plugin and never
//! mutated. Snapshots are plain name → value maps with the wall-clock time
//! they were taken at.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Raw metric values keyed by fully-qualified metric name.
pub type MetricValues = BTreeMap<String, f64>;

/// Graph definitions keyed by namespace. The empty key means "no
/// sub-namespace".
pub type GraphSet = BTreeMap<String, GraphDefinition>;

/// Unit-of-measure tags understood by the agent.
pub mod units {
    pub const FLOAT: &str = "float";
    pub const INTEGER: &str = "integer";
    pub const PERCENTAGE: &str = "percentage";
    pub const SECONDS: &str = "seconds";
    pub const MILLISECONDS: &str = "milliseconds";
    pub const BYTES: &str = "bytes";
    pub const BYTES_PER_SECOND: &str = "bytes/sec";
    pub const BITS_PER_SECOND: &str = "bits/sec";
    pub const IOPS: &str = "iops";
}

// ── Definitions ───────────────────────────────────────────────────

/// A single series declared by a plugin.
///
/// `name` may contain the wildcard tokens `*` or `#`, each standing for one
/// path segment of `[-a-zA-Z0-9_]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricDefinition {
    pub name: String,
    /// Display label. Derived from `name` when absent.
    #[serde(default)]
    pub label: Option<String>,
    /// Report the per-minute delta instead of the raw value.
    #[serde(default, alias = "diff")]
    pub rate: bool,
    /// Stacking hint for the agent's graph rendering.
    #[serde(default)]
    pub stacked: bool,
    /// Multiplier applied to the reported value.
    #[serde(default)]
    pub scale: Option<f64>,
}

impl MetricDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Mark this metric as a monotonic counter reported as a rate.
    pub fn rate(mut self) -> Self {
        self.rate = true;
        self
    }

    pub fn stacked(mut self) -> Self {
        self.stacked = true;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// The effective scale factor. A zero scale counts as unset.
    pub fn scale_factor(&self) -> Option<f64> {
        self.scale.filter(|s| *s != 0.0)
    }
}

/// A graph: display label, unit, and the metrics sharing one namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GraphDefinition {
    /// Display label. Derived from the namespace key when absent.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,
}

impl GraphDefinition {
    pub fn new(unit: impl Into<String>, metrics: Vec<MetricDefinition>) -> Self {
        Self {
            label: None,
            unit: unit.into(),
            metrics,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Whether any declared metric is reported as a rate.
///
/// When this is false the run never touches the state file.
pub fn has_rate_metric(graphs: &GraphSet) -> bool {
    graphs
        .values()
        .flat_map(|g| g.metrics.iter())
        .any(|m| m.rate)
}

// ── Snapshot ──────────────────────────────────────────────────────

/// Metric values together with the time they were collected.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub values: MetricValues,
    pub timestamp: SystemTime,
}

impl Snapshot {
    pub fn new(values: MetricValues, timestamp: SystemTime) -> Self {
        Self { values, timestamp }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graphs_with(metric: MetricDefinition) -> GraphSet {
        let mut graphs = GraphSet::new();
        graphs.insert(
            "hoge".to_string(),
            GraphDefinition::new(units::INTEGER, vec![metric]),
        );
        graphs
    }

    #[test]
    fn rate_metric_detected() {
        let graphs = graphs_with(MetricDefinition::new("hoge1").with_label("hoge1").rate());
        assert!(has_rate_metric(&graphs));
    }

    #[test]
    fn gauge_only_has_no_rate_metric() {
        let graphs = graphs_with(MetricDefinition::new("hoge1").with_label("hoge1"));
        assert!(!has_rate_metric(&graphs));
        assert!(!has_rate_metric(&GraphSet::new()));
    }

    #[test]
    fn zero_scale_is_unset() {
        assert_eq!(MetricDefinition::new("a").with_scale(0.0).scale_factor(), None);
        assert_eq!(
            MetricDefinition::new("a").with_scale(8.0).scale_factor(),
            Some(8.0)
        );
    }

    #[test]
    fn diff_alias_deserializes_as_rate() {
        let m: MetricDefinition =
            serde_json::from_str(r#"{"name":"cmd_get","diff":true}"#).unwrap();
        assert!(m.rate);
        assert_eq!(m.label, None);
    }
}
