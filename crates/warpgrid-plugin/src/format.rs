//! Output formats understood by the agent.
//!
//! Value mode prints one `name\tvalue\tepoch` line per metric. Definition
//! mode prints a header line followed by a single JSON document describing
//! every graph.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::SystemTime;

use serde::Serialize;
use tracing::warn;

use crate::error::PluginResult;
use crate::rate::unix_secs;
use crate::resolve::join_key;
use crate::types::GraphSet;

/// First line of definition-mode output.
pub const DEFINITION_HEADER: &str = "# warpgrid-agent-plugin";

/// Render a value: integral values without a fraction, others with six
/// fractional digits. Negative zero prints as `0`.
pub fn format_value(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.6}")
    }
}

/// Write one value line. Non-finite values are logged and dropped.
///
/// Returns whether a line was written.
pub fn write_value<W: Write>(
    w: &mut W,
    name: &str,
    value: f64,
    now: SystemTime,
) -> std::io::Result<bool> {
    if !value.is_finite() {
        warn!(key = %name, value, "invalid value");
        return Ok(false);
    }
    writeln!(w, "{name}\t{}\t{}", format_value(value), unix_secs(now))?;
    Ok(true)
}

#[derive(Debug, Serialize)]
struct DefinitionDoc<'a> {
    graphs: BTreeMap<String, GraphDoc<'a>>,
}

#[derive(Debug, Serialize)]
struct GraphDoc<'a> {
    label: String,
    unit: &'a str,
    metrics: Vec<MetricDoc<'a>>,
}

#[derive(Debug, Serialize)]
struct MetricDoc<'a> {
    name: &'a str,
    label: String,
    stacked: bool,
}

/// Write the definition document for `graphs`.
///
/// Graph keys are qualified with `prefix` when one is declared; missing
/// labels are derived from the qualified key or the metric name.
pub fn write_definitions<W: Write>(
    w: &mut W,
    graphs: &GraphSet,
    prefix: Option<&str>,
) -> PluginResult<()> {
    let mut doc = DefinitionDoc {
        graphs: BTreeMap::new(),
    };

    for (key, graph) in graphs {
        let key = match prefix {
            Some(prefix) => join_key(prefix, key),
            None => key.clone(),
        };
        let metrics = graph
            .metrics
            .iter()
            .map(|m| MetricDoc {
                name: &m.name,
                label: m.label.clone().unwrap_or_else(|| title(&m.name)),
                stacked: m.stacked,
            })
            .collect();
        let label = graph.label.clone().unwrap_or_else(|| title(&key));
        doc.graphs.insert(
            key,
            GraphDoc {
                label,
                unit: &graph.unit,
                metrics,
            },
        );
    }

    writeln!(w, "{DEFINITION_HEADER}")?;
    serde_json::to_writer(&mut *w, &doc)?;
    writeln!(w)?;
    Ok(())
}

/// Derive a display label from a metric key: separators become spaces,
/// wildcards are removed, and each word gets an upper-case first letter.
pub fn title(key: &str) -> String {
    let spaced: String = key
        .chars()
        .filter(|c| !matches!(c, '*' | '#'))
        .map(|c| if matches!(c, '.' | '_') { ' ' } else { c })
        .collect();

    let mut out = String::with_capacity(spaced.len());
    let mut word_start = true;
    for c in spaced.chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        word_start = c.is_whitespace();
    }
    out.trim().to_string()
}
