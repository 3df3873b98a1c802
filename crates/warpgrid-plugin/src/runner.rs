//! PluginRunner — one full plugin run, from fetch to persisted state.
//!
//! ```text
//! fetch ──▶ load previous ──▶ resolve ──▶ rate/scale ──▶ print ──▶ save
//!   │             │
//!   └─ fatal      └─ recently updated: stop, print nothing
//! ```
//!
//! Per-metric problems (missing keys, counter resets, long gaps) are
//! logged and skip only the affected series. Failing to fetch or to save
//! state is fatal.

use std::io::Write;
use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::config::PluginEnv;
use crate::error::{PluginError, PluginResult, StateError};
use crate::format::{write_definitions, write_value};
use crate::plugin::Plugin;
use crate::rate::rate;
use crate::resolve::{Resolved, join_key, resolve};
use crate::state::StateStore;
use crate::types::{MetricDefinition, Snapshot, has_rate_metric};

/// How a run ended when nothing fatal happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Output was written; `lines` counts value lines (zero in definition mode).
    Emitted { lines: usize },
    /// The previous state was too fresh; another run is likely in flight.
    Skipped,
}

/// Drives a [`Plugin`] through a single run.
pub struct PluginRunner<P> {
    plugin: P,
    env: PluginEnv,
    state: Option<StateStore>,
}

impl<P: Plugin> PluginRunner<P> {
    /// Create a runner configured from the process environment.
    pub fn new(plugin: P) -> Self {
        Self::with_env(plugin, PluginEnv::from_env())
    }

    pub fn with_env(plugin: P, env: PluginEnv) -> Self {
        Self {
            plugin,
            env,
            state: None,
        }
    }

    /// Keep state at an explicit path instead of the derived one.
    pub fn with_tempfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.state = Some(StateStore::at(path));
        self
    }

    /// Keep state in a file named `basename` inside the work directory.
    pub fn with_tempfile_basename(mut self, basename: &str) -> Self {
        self.state = Some(StateStore::at(self.env.work_dir().join(basename)));
        self
    }

    /// The store this runner reads and writes.
    pub fn state_store(&self) -> StateStore {
        match &self.state {
            Some(store) => store.clone(),
            None => {
                let args: Vec<String> = std::env::args().collect();
                StateStore::for_invocation(
                    &self.env.work_dir(),
                    self.plugin.metric_key_prefix(),
                    &args,
                )
            }
        }
    }

    /// Run against stdout in the mode selected by the environment.
    pub fn run(&self) -> PluginResult<RunOutcome> {
        let mut out = std::io::stdout().lock();
        let outcome = if self.env.definitions {
            self.run_definitions(&mut out)?
        } else {
            self.run_values_at(&mut out, SystemTime::now())?
        };
        out.flush()?;
        Ok(outcome)
    }

    /// Print the graph definition document.
    pub fn run_definitions<W: Write>(&self, w: &mut W) -> PluginResult<RunOutcome> {
        let graphs = self.plugin.graph_definition();
        write_definitions(w, &graphs, self.plugin.metric_key_prefix())?;
        Ok(RunOutcome::Emitted { lines: 0 })
    }

    /// Fetch, compute, and print values as of `now`, then persist state.
    pub fn run_values_at<W: Write>(&self, w: &mut W, now: SystemTime) -> PluginResult<RunOutcome> {
        let values = self.plugin.fetch_metrics().map_err(PluginError::Fetch)?;
        let graphs = self.plugin.graph_definition();
        let prefix = self.plugin.metric_key_prefix();

        let store = has_rate_metric(&graphs).then(|| self.state_store());
        let previous = match &store {
            Some(store) => match store.load(now) {
                Ok(previous) => previous,
                Err(StateError::RecentlyUpdated) => {
                    info!(path = ?store.path(), "state was recently updated, skipping run");
                    return Ok(RunOutcome::Skipped);
                }
                Err(e) => {
                    warn!(error = %e, "ignoring previous state");
                    None
                }
            },
            None => None,
        };

        let mut lines = 0;
        for (namespace, graph) in &graphs {
            for metric in &graph.metrics {
                let resolved = match resolve(namespace, metric, &values) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        warn!(error = %e, "skipping metric");
                        continue;
                    }
                };
                for series in resolved {
                    let Some(value) = metric_value(metric, &series, previous.as_ref(), now) else {
                        continue;
                    };
                    let name = match prefix {
                        Some(prefix) => join_key(prefix, &series.name),
                        None => series.name,
                    };
                    if write_value(w, &name, value, now)? {
                        lines += 1;
                    }
                }
            }
        }

        if let Some(store) = &store {
            store.save(&values, now).map_err(PluginError::SaveState)?;
        }

        debug!(lines, metrics = values.len(), "values emitted");
        Ok(RunOutcome::Emitted { lines })
    }
}

/// The value to report for one resolved key, or `None` to skip it this run.
fn metric_value(
    metric: &MetricDefinition,
    series: &Resolved,
    previous: Option<&Snapshot>,
    now: SystemTime,
) -> Option<f64> {
    let key = &series.key;
    let mut value = series.value;
    if metric.rate {
        let Some((last_value, last_time)) =
            previous.and_then(|p| p.get(key).map(|v| (v, p.timestamp)))
        else {
            info!(%key, "metric did not exist at last fetch");
            return None;
        };
        value = match rate(series.value, now, last_value, last_time) {
            Ok(diff) => diff,
            Err(e) => {
                warn!(%key, error = %e, "skipping rate");
                return None;
            }
        };
    }
    if let Some(scale) = metric.scale_factor() {
        value *= scale;
    }
    Some(value)
}
