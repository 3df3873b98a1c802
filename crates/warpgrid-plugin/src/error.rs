//! Error types for the plugin helper.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for snapshot store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Result type alias for a whole plugin run.
pub type PluginResult<T> = Result<T, PluginError>;

/// Why a per-minute rate could not be derived for one metric.
///
/// These are per-metric and per-cycle: the metric is skipped for this run
/// and everything else proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RateError {
    #[error("too long duration since last fetch: {elapsed_secs}s")]
    TooLongGap { elapsed_secs: i64 },

    #[error("counter seems to be reset (diff {diff})")]
    CounterReset { diff: f64 },

    #[error("non-positive interval since last fetch: {elapsed_secs}s")]
    InvalidInterval { elapsed_secs: i64 },
}

/// Errors from loading or saving the persisted snapshot.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state was recently updated")]
    RecentlyUpdated,

    #[error("corrupt state file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(String),
}

/// Fatal errors that abort a plugin run with a non-zero exit.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to fetch metrics: {0}")]
    Fetch(#[source] anyhow::Error),

    #[error("failed to save state: {0}")]
    SaveState(#[source] StateError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to encode graph definitions: {0}")]
    Definitions(#[from] serde_json::Error),

    #[error("invalid metric pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
