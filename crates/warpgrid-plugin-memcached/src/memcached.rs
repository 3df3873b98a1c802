//! memcached `stats` source.
//!
//! Speaks the text protocol: sends `stats`, then reads `STAT <name> <value>`
//! lines until `END`.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{debug, warn};

use warpgrid_plugin::{GraphDefinition, GraphSet, MetricDefinition, MetricValues, Plugin, units};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Reports a memcached server's counters.
pub struct MemcachedPlugin {
    pub target: String,
    pub prefix: Option<String>,
    /// Replaces the built-in graphs when set.
    pub graphs: Option<GraphSet>,
}

impl MemcachedPlugin {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            target: format!("{host}:{port}"),
            prefix: None,
            graphs: None,
        }
    }
}

impl Plugin for MemcachedPlugin {
    fn fetch_metrics(&self) -> anyhow::Result<MetricValues> {
        let addr = self
            .target
            .to_socket_addrs()
            .with_context(|| format!("resolving {}", self.target))?
            .next()
            .with_context(|| format!("no address for {}", self.target))?;
        let mut conn = TcpStream::connect_timeout(&addr, IO_TIMEOUT)
            .with_context(|| format!("connecting to {}", self.target))?;
        conn.set_read_timeout(Some(IO_TIMEOUT))?;
        conn.set_write_timeout(Some(IO_TIMEOUT))?;

        conn.write_all(b"stats\r\n")?;
        let stats = parse_stats(BufReader::new(conn))?;
        debug!(target = %self.target, count = stats.len(), "fetched memcached stats");
        Ok(stats)
    }

    fn graph_definition(&self) -> GraphSet {
        self.graphs.clone().unwrap_or_else(default_graphs)
    }

    fn metric_key_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }
}

/// Read a `stats` response up to its `END` line.
pub fn parse_stats<R: BufRead>(reader: R) -> anyhow::Result<MetricValues> {
    let mut stats = MetricValues::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end();
        if line == "END" {
            return Ok(stats);
        }
        if line.starts_with("ERROR") || line.starts_with("SERVER_ERROR") {
            bail!("memcached replied {line:?}");
        }

        let mut fields = line.split_whitespace();
        let (Some("STAT"), Some(name), Some(raw)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        match raw.parse::<f64>() {
            Ok(value) => {
                stats.insert(name.to_string(), value);
            }
            Err(_) => warn!(%name, value = %raw, "skipping non-numeric stat"),
        }
    }
    bail!("connection closed before END")
}

fn graph(label: &str, unit: &str, metrics: Vec<MetricDefinition>) -> GraphDefinition {
    GraphDefinition::new(unit, metrics).with_label(label)
}

fn counter(name: &str, label: &str) -> MetricDefinition {
    MetricDefinition::new(name).with_label(label).rate()
}

/// The graphs reported when no manifest overrides them.
pub fn default_graphs() -> GraphSet {
    let mut graphs = GraphSet::new();
    graphs.insert(
        "memcached.connections".to_string(),
        graph(
            "Memcached Connections",
            units::INTEGER,
            vec![MetricDefinition::new("curr_connections").with_label("Connections")],
        ),
    );
    graphs.insert(
        "memcached.cmd".to_string(),
        graph(
            "Memcached Command",
            units::INTEGER,
            vec![
                counter("cmd_get", "Get"),
                counter("cmd_set", "Set"),
                counter("cmd_flush", "Flush"),
                counter("cmd_touch", "Touch"),
            ],
        ),
    );
    graphs.insert(
        "memcached.hitmiss".to_string(),
        graph(
            "Memcached Hits/Misses",
            units::INTEGER,
            vec![
                counter("get_hits", "Get Hits"),
                counter("get_misses", "Get Misses"),
                counter("delete_hits", "Delete Hits"),
                counter("delete_misses", "Delete Misses"),
                counter("incr_hits", "Incr Hits"),
                counter("incr_misses", "Incr Misses"),
                counter("cas_hits", "Cas Hits"),
                counter("cas_misses", "Cas Misses"),
                counter("touch_hits", "Touch Hits"),
                counter("touch_misses", "Touch Misses"),
            ],
        ),
    );
    graphs.insert(
        "memcached.evictions".to_string(),
        graph(
            "Memcached Evictions",
            units::INTEGER,
            vec![counter("evictions", "Evictions")],
        ),
    );
    graphs.insert(
        "memcached.unfetched".to_string(),
        graph(
            "Memcached Unfetched",
            units::INTEGER,
            vec![
                counter("expired_unfetched", "Expired unfetched"),
                counter("evicted_unfetched", "Evicted unfetched"),
            ],
        ),
    );
    graphs.insert(
        "memcached.rusage".to_string(),
        graph(
            "Memcached Resource Usage",
            units::FLOAT,
            vec![counter("rusage_user", "User"), counter("rusage_system", "System")],
        ),
    );
    graphs.insert(
        "memcached.bytes".to_string(),
        graph(
            "Memcached Traffics",
            units::BYTES,
            vec![counter("bytes_read", "Read"), counter("bytes_written", "Write")],
        ),
    );
    graphs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_stats_until_end() {
        let reply = "STAT pid 1234\r\nSTAT version 1.6.21\r\nSTAT cmd_get 11\r\nSTAT rusage_user 0.125\r\nEND\r\nSTAT late 1\r\n";
        let stats = parse_stats(Cursor::new(reply)).unwrap();

        assert_eq!(stats.get("pid"), Some(&1234.0));
        assert_eq!(stats.get("cmd_get"), Some(&11.0));
        assert_eq!(stats.get("rusage_user"), Some(&0.125));
        // Non-numeric and post-END lines are ignored.
        assert!(!stats.contains_key("version"));
        assert!(!stats.contains_key("late"));
    }

    #[test]
    fn truncated_reply_is_an_error() {
        assert!(parse_stats(Cursor::new("STAT cmd_get 11\r\n")).is_err());
    }

    #[test]
    fn error_reply_is_an_error() {
        assert!(parse_stats(Cursor::new("ERROR\r\n")).is_err());
    }

    #[test]
    fn default_graphs_track_rates() {
        let graphs = default_graphs();
        assert!(warpgrid_plugin::has_rate_metric(&graphs));
        assert!(!graphs["memcached.connections"].metrics[0].rate);
        assert!(graphs["memcached.cmd"].metrics.iter().all(|m| m.rate));
    }

    #[test]
    fn manifest_graphs_override_defaults() {
        let mut custom = GraphSet::new();
        custom.insert(
            "only".to_string(),
            GraphDefinition::new(units::INTEGER, vec![MetricDefinition::new("pid")]),
        );
        let plugin = MemcachedPlugin {
            graphs: Some(custom.clone()),
            ..MemcachedPlugin::new("localhost", 11211)
        };
        assert_eq!(plugin.graph_definition(), custom);
        assert_eq!(plugin.target, "localhost:11211");
    }
}
