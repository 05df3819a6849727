//! Runtime configuration passed into the lifecycle engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Filesystem locations the runtime reads and writes.
///
/// Passed explicitly to the engine so tests can point every path at a
/// temporary directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory holding `<id>/state.json` for each container.
    pub state_root: PathBuf,
    /// Cgroup base path; each container gets `<cgroup_root>/<id>`.
    pub cgroup_root: PathBuf,
    /// Binary re-executed as the container init process.
    pub init_binary: PathBuf,
}

impl RuntimeConfig {
    /// Builds a configuration from defaults, overridden by `RUNLET_ROOT`
    /// and `RUNLET_CGROUP_ROOT` when they are set and non-empty.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(root) = non_empty_env(constants::STATE_ROOT_ENV) {
            config.state_root = PathBuf::from(root);
        }
        if let Some(root) = non_empty_env(constants::CGROUP_ROOT_ENV) {
            config.cgroup_root = PathBuf::from(root);
        }
        config
    }

    /// Returns the state directory of a single container.
    #[must_use]
    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.state_root.join(id)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_root: PathBuf::from(constants::DEFAULT_STATE_ROOT),
            cgroup_root: PathBuf::from(constants::DEFAULT_CGROUP_ROOT),
            init_binary: PathBuf::from(constants::DEFAULT_INIT_BINARY),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_match_constants() {
        let config = RuntimeConfig::default();
        assert_eq!(config.state_root, PathBuf::from("/run/runlet"));
        assert_eq!(config.cgroup_root, PathBuf::from("/sys/fs/cgroup/runlet"));
        assert_eq!(config.init_binary, PathBuf::from("/proc/self/exe"));
    }

    #[test]
    fn container_dir_joins_id() {
        let config = RuntimeConfig {
            state_root: PathBuf::from("/tmp/state"),
            ..RuntimeConfig::default()
        };
        assert_eq!(config.container_dir("c1"), PathBuf::from("/tmp/state/c1"));
    }
}
