//! Plugin configuration: process environment and TOML graph manifests.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::GraphSet;

/// Presence of this variable (non-empty) selects definition mode.
pub const META_ENV: &str = "WARPGRID_AGENT_PLUGIN_META";

/// Directory holding plugin state files. Defaults to the OS temp dir.
pub const WORKDIR_ENV: &str = "WARPGRID_PLUGIN_WORKDIR";

/// Settings the agent passes to a plugin through its environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginEnv {
    /// Print graph definitions instead of values.
    pub definitions: bool,
    /// Override for the state file directory.
    pub work_dir: Option<PathBuf>,
}

impl PluginEnv {
    /// Read settings from the current process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Read settings through an arbitrary lookup (for testing).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            definitions: non_empty(META_ENV).is_some(),
            work_dir: non_empty(WORKDIR_ENV).map(PathBuf::from),
        }
    }

    /// The directory state files live in.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Graph definitions declared in a TOML file.
///
/// ```toml
/// [graphs."memcached.cmd"]
/// label = "Memcached Command"
/// unit = "integer"
///
/// [[graphs."memcached.cmd".metrics]]
/// name = "cmd_get"
/// label = "Get"
/// diff = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphManifest {
    /// Optional metric key prefix for the plugin.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub graphs: GraphSet,
}

impl GraphManifest {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let manifest: GraphManifest = toml::from_str(content)?;
        Ok(manifest)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_means_value_mode() {
        let env = PluginEnv::from_lookup(lookup(&[]));
        assert!(!env.definitions);
        assert_eq!(env.work_dir(), std::env::temp_dir());
    }

    #[test]
    fn meta_variable_selects_definitions() {
        let env = PluginEnv::from_lookup(lookup(&[(META_ENV, "1")]));
        assert!(env.definitions);

        let env = PluginEnv::from_lookup(lookup(&[(META_ENV, "")]));
        assert!(!env.definitions);
    }

    #[test]
    fn workdir_override() {
        let env = PluginEnv::from_lookup(lookup(&[(WORKDIR_ENV, "/tmp/somewhere")]));
        assert_eq!(env.work_dir(), PathBuf::from("/tmp/somewhere"));
    }

    #[test]
    fn parse_manifest() {
        let manifest = GraphManifest::from_str(
            r#"
prefix = "memcached"

[graphs."cmd"]
label = "Memcached Command"
unit = "integer"

[[graphs."cmd".metrics]]
name = "cmd_get"
label = "Get"
diff = true

[[graphs."cmd".metrics]]
name = "cmd_set"
scale = 2.0
"#,
        )
        .unwrap();

        assert_eq!(manifest.prefix.as_deref(), Some("memcached"));
        let graph = &manifest.graphs["cmd"];
        assert_eq!(graph.label.as_deref(), Some("Memcached Command"));
        assert_eq!(graph.metrics.len(), 2);
        assert!(graph.metrics[0].rate);
        assert!(!graph.metrics[1].rate);
        assert_eq!(graph.metrics[1].scale, Some(2.0));
    }

    #[test]
    fn manifest_round_trips_through_toml() {
        let manifest = GraphManifest::from_str(
            r#"
[graphs."piyo.#"]
unit = "float"

[[graphs."piyo.#".metrics]]
name = "bar"
"#,
        )
        .unwrap();
        let reparsed = GraphManifest::from_str(&manifest.to_toml_string().unwrap()).unwrap();
        assert_eq!(manifest, reparsed);
    }
}
