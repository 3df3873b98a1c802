//! StateStore — the previous run's snapshot, persisted as a JSON file.
//!
//! The file is a flat JSON object of metric name → number, plus the
//! reserved [`LAST_TIME_KEY`] holding the Unix time the snapshot was
//! taken. Each save replaces the whole file.
//!
//! One file exists per plugin identity: the declared key prefix, or the
//! executable's name, combined with a hash of the command-line arguments
//! so that two instances watching different targets keep separate state.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::rate::unix_secs;
use crate::types::{MetricValues, Snapshot};

/// Reserved key carrying the snapshot timestamp inside the state file.
pub const LAST_TIME_KEY: &str = "_lastTime";

/// A snapshot younger than this is assumed to come from an overlapping run.
pub const RECENT_UPDATE_GUARD: Duration = Duration::from_secs(1);

const FILE_PREFIX: &str = "warpgrid-plugin-";

static SANITIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^-_.A-Za-z0-9]").expect("sanitize pattern is valid")
});

/// Reads and writes the persisted snapshot at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Use an explicit state file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Derive the state file for a plugin invocation inside `work_dir`.
    ///
    /// `args` is the full argument vector including the program path.
    pub fn for_invocation(work_dir: &Path, prefix: Option<&str>, args: &[String]) -> Self {
        Self::at(work_dir.join(state_file_name(prefix, args)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previous snapshot.
    ///
    /// Returns `Ok(None)` when nothing has been persisted yet.
    pub fn load(&self, now: SystemTime) -> StateResult<Option<Snapshot>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "no previous state");
                return Ok(None);
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut values: MetricValues =
            serde_json::from_slice(&content).map_err(|e| self.corrupt(e.to_string()))?;
        let last_secs = values
            .remove(LAST_TIME_KEY)
            .ok_or_else(|| self.corrupt(format!("missing {LAST_TIME_KEY}")))?;
        let timestamp = (last_secs.is_finite() && (0.0..=i64::MAX as f64).contains(&last_secs))
            .then(|| UNIX_EPOCH.checked_add(Duration::from_secs(last_secs as u64)))
            .flatten()
            .ok_or_else(|| self.corrupt(format!("invalid {LAST_TIME_KEY}: {last_secs}")))?;

        match now.duration_since(timestamp) {
            Ok(age) if age >= RECENT_UPDATE_GUARD => {}
            Ok(_) => return Err(StateError::RecentlyUpdated),
            Err(e) => {
                warn!(
                    path = ?self.path,
                    ahead_secs = e.duration().as_secs(),
                    "state timestamp is in the future, skipping until the clock catches up"
                );
                return Err(StateError::RecentlyUpdated);
            }
        }

        debug!(path = ?self.path, metrics = values.len(), "previous state loaded");
        Ok(Some(Snapshot::new(values, timestamp)))
    }

    /// Persist `values` as the snapshot taken at `now`, replacing any
    /// previous content. Non-finite values are dropped first.
    pub fn save(&self, values: &MetricValues, now: SystemTime) -> StateResult<()> {
        if values.contains_key(LAST_TIME_KEY) {
            warn!(key = LAST_TIME_KEY, "metric uses the reserved timestamp key and is not saved");
        }
        let mut stored: MetricValues = values
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        stored.insert(LAST_TIME_KEY.to_string(), unix_secs(now) as f64);

        let body = serde_json::to_vec(&stored).map_err(|e| StateError::Serialize(e.to_string()))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| self.io(source))?;
        }
        let tmp = self.tmp_path();
        std::fs::write(&tmp, body).map_err(|source| self.io(source))?;
        std::fs::rename(&tmp, &self.path).map_err(|source| self.io(source))?;

        debug!(path = ?self.path, metrics = stored.len() - 1, "state saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn corrupt(&self, reason: String) -> StateError {
        StateError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }

    fn io(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// File name for a plugin invocation's state.
///
/// `warpgrid-plugin-<id>-<sha256 of args[1..] joined by spaces>`, where
/// `<id>` is the declared prefix or the sanitized executable name.
pub fn state_file_name(prefix: Option<&str>, args: &[String]) -> String {
    let id = match prefix {
        Some(prefix) => prefix.to_string(),
        None => {
            let program = args
                .first()
                .and_then(|p| Path::new(p).file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let sanitized = SANITIZE_RE.replace_all(&program, "_");
            sanitized
                .strip_prefix(FILE_PREFIX)
                .unwrap_or(sanitized.as_ref())
                .to_string()
        }
    };
    let joined = args.get(1..).unwrap_or_default().join(" ");
    let fingerprint = hex::encode(Sha256::digest(joined.as_bytes()));
    format!("{FILE_PREFIX}{id}-{fingerprint}")
}
