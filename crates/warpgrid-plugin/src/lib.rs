//! warpgrid-plugin — helper library for WarpGrid agent plugins.
//!
//! A plugin fetches a snapshot of raw counters from some resource,
//! turns selected counters into per-minute rates against the previous
//! run's snapshot, and prints either value lines or a graph definition
//! document for the agent.
//!
//! # Architecture
//!
//! ```text
//! PluginRunner
//!   ├── Plugin::fetch_metrics()   ← current snapshot
//!   ├── StateStore::load()        ← previous snapshot + timestamp
//!   ├── resolve()                 → concrete keys (wildcards expanded)
//!   ├── rate()                    → per-minute delta
//!   ├── write_value()             → `name\tvalue\tepoch`
//!   └── StateStore::save()        → current snapshot persisted
//!
//! Definition mode
//!   └── write_definitions()       → header + JSON graph document
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod plugin;
pub mod rate;
pub mod resolve;
pub mod runner;
pub mod state;
pub mod types;

pub use config::{GraphManifest, PluginEnv};
pub use error::{PluginError, PluginResult, RateError, StateError, StateResult};
pub use plugin::Plugin;
pub use rate::rate;
pub use resolve::{MetricPattern, Resolved, resolve};
pub use runner::{PluginRunner, RunOutcome};
pub use state::StateStore;
pub use types::*;
