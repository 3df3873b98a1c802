//! Metric resolution — expands a declared metric into concrete series.
//!
//! A literal metric is read from the snapshot under its own name and
//! reported under `namespace.name`. A namespace or name containing `*` or
//! `#` is compiled into a pattern matched against every snapshot key; each
//! matching key is reported under itself.

use regex::Regex;

use crate::error::{PluginError, PluginResult};
use crate::types::{MetricDefinition, MetricValues};

const WILDCARDS: [char; 2] = ['*', '#'];
const SEGMENT: &str = "[-a-zA-Z0-9_]+";

/// One concrete series produced by resolving a metric definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Reported name, without the plugin's key prefix.
    pub name: String,
    /// Key the value was read from; also its key in the previous snapshot.
    pub key: String,
    pub value: f64,
}

/// A compiled namespace + metric name pattern.
#[derive(Debug, Clone)]
pub enum MetricPattern {
    Literal { name: String, key: String },
    Wildcard { pattern: String, regex: Regex },
}

impl MetricPattern {
    /// Compile the pattern for `name` inside `namespace`.
    pub fn new(namespace: &str, name: &str) -> PluginResult<Self> {
        let pattern = join_key(namespace, name);
        if !pattern.contains(WILDCARDS) {
            return Ok(Self::Literal {
                name: pattern,
                key: name.to_string(),
            });
        }

        let body = pattern
            .split(WILDCARDS)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(SEGMENT);
        let regex = Regex::new(&format!("^{body}$")).map_err(|source| PluginError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        Ok(Self::Wildcard { pattern, regex })
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard { .. })
    }

    /// Whether a snapshot key feeds this pattern.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Literal { key: literal, .. } => literal == key,
            Self::Wildcard { regex, .. } => regex.is_match(key),
        }
    }

    /// Every series in `values` covered by this pattern, in key order.
    pub fn resolve(&self, values: &MetricValues) -> Vec<Resolved> {
        match self {
            Self::Literal { name, key } => values
                .get(key)
                .map(|value| {
                    vec![Resolved {
                        name: name.clone(),
                        key: key.clone(),
                        value: *value,
                    }]
                })
                .unwrap_or_default(),
            Self::Wildcard { regex, .. } => values
                .iter()
                .filter(|(k, _)| regex.is_match(k))
                .map(|(k, v)| Resolved {
                    name: k.clone(),
                    key: k.clone(),
                    value: *v,
                })
                .collect(),
        }
    }
}

/// Expand `metric` in `namespace` against the current snapshot values.
///
/// A literal name missing from the snapshot resolves to nothing.
pub fn resolve(
    namespace: &str,
    metric: &MetricDefinition,
    values: &MetricValues,
) -> PluginResult<Vec<Resolved>> {
    Ok(MetricPattern::new(namespace, &metric.name)?.resolve(values))
}

/// Dot-join key parts, skipping empty ones.
pub(crate) fn join_key(namespace: &str, name: &str) -> String {
    match (namespace.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => namespace.to_string(),
        (false, false) => format!("{namespace}.{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(entries: &[(&str, f64)]) -> MetricValues {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn names(resolved: &[Resolved]) -> Vec<&str> {
        resolved.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn literal_reads_bare_name_and_reports_namespaced() {
        let snapshot = values(&[("cmd_get", 11.0), ("cmd_set", 8.0)]);
        let resolved = resolve("memcached.cmd", &MetricDefinition::new("cmd_get"), &snapshot).unwrap();
        assert_eq!(
            resolved,
            vec![Resolved {
                name: "memcached.cmd.cmd_get".to_string(),
                key: "cmd_get".to_string(),
                value: 11.0,
            }]
        );
    }

    #[test]
    fn empty_namespace_is_not_joined() {
        let snapshot = values(&[("bar", 15.0)]);
        let resolved = resolve("", &MetricDefinition::new("bar"), &snapshot).unwrap();
        assert_eq!(names(&resolved), vec!["bar"]);
    }

    #[test]
    fn missing_literal_resolves_to_nothing() {
        let snapshot = values(&[("cmd_set", 8.0)]);
        let resolved = resolve("", &MetricDefinition::new("cmd_get"), &snapshot).unwrap();
        assert!(resolved.is_empty());
        let resolved = resolve("memcached", &MetricDefinition::new("cmd_get"), &snapshot).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn hash_wildcard_matches_one_segment() {
        let snapshot = values(&[
            ("foo.1.bar", 1000.0),
            ("foo.2.bar", 2000.0),
            ("foo.3.baz", 3000.0),
            ("foo.1.2.bar", 4000.0),
            ("foo..bar", 5000.0),
        ]);
        let resolved = resolve("foo.#", &MetricDefinition::new("bar"), &snapshot).unwrap();
        assert_eq!(names(&resolved), vec!["foo.1.bar", "foo.2.bar"]);
        assert_eq!(resolved[1].key, "foo.2.bar");
        assert_eq!(resolved[1].value, 2000.0);
    }

    #[test]
    fn star_wildcard_in_metric_name() {
        let snapshot = values(&[("foo.1", 1000.0), ("foo.2", 2000.0), ("bar.1", 1.0)]);
        let resolved = resolve("foo", &MetricDefinition::new("*"), &snapshot).unwrap();
        assert_eq!(names(&resolved), vec!["foo.1", "foo.2"]);
    }

    #[test]
    fn wildcard_is_anchored_at_both_ends() {
        let pattern = MetricPattern::new("piyo.#", "bar").unwrap();
        assert!(pattern.is_wildcard());
        assert!(pattern.matches("piyo.1.bar"));
        assert!(!pattern.matches("xpiyo.1.bar"));
        assert!(!pattern.matches("piyo.1.barx"));
        assert!(!pattern.matches("piyo.1.bar.extra"));
    }

    #[test]
    fn literal_dots_are_not_regex_wildcards() {
        let pattern = MetricPattern::new("a.#", "b.c").unwrap();
        assert!(pattern.matches("a.x.b.c"));
        assert!(!pattern.matches("a.x.bxc"));
    }

    #[test]
    fn segment_characters() {
        let pattern = MetricPattern::new("disk", "#").unwrap();
        assert!(pattern.matches("disk.sda-1_x"));
        assert!(!pattern.matches("disk.sda/1"));
    }
}
