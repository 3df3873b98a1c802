//! The interface a concrete plugin implements.

use crate::types::{GraphSet, MetricValues};

/// A metric source together with the graphs it declares.
///
/// The three capabilities are checked independently by the runner:
/// fetching is required for value mode, graph definitions drive both
/// modes, and a key prefix is optional.
pub trait Plugin {
    /// Collect the current raw values from the monitored resource.
    fn fetch_metrics(&self) -> anyhow::Result<MetricValues>;

    /// Graphs this plugin reports, keyed by namespace.
    fn graph_definition(&self) -> GraphSet;

    /// Prefix prepended to every reported key and graph name.
    ///
    /// Also identifies the plugin's state file in place of the
    /// executable name.
    fn metric_key_prefix(&self) -> Option<&str> {
        None
    }
}
