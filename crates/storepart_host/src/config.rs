//! Host configuration, usually read from a YAML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{HostError, HostResult};

/// Default capacity of the channel feeding dispatched actions to effect
/// watchers.
pub const DEFAULT_ACTION_CHANNEL_CAPACITY: usize = 1024;

/// How stores are assembled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory scanned for slice manifests at startup. Nothing is loaded
    /// when unset.
    #[serde(alias = "global-stores")]
    pub global_stores_dir: Option<PathBuf>,

    /// How many dispatched actions a lagging effect watcher may fall behind
    /// before it starts missing them.
    pub action_channel_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            global_stores_dir: None,
            action_channel_capacity: DEFAULT_ACTION_CHANNEL_CAPACITY,
        }
    }
}

impl HostConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> HostResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> HostResult<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading host config");
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    /// Reject settings that can't work.
    pub fn validate(&self) -> HostResult<()> {
        if self.action_channel_capacity == 0 {
            return Err(HostError::Config(
                "action_channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("{}", None, 1024)]
    #[test_case("global_stores_dir: ./stores", Some("./stores"), 1024)]
    #[test_case("global-stores: /srv/stores\naction_channel_capacity: 8", Some("/srv/stores"), 8)]
    fn parses_yaml(yaml: &str, dir: Option<&str>, capacity: usize) {
        let config = HostConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.global_stores_dir, dir.map(PathBuf::from));
        assert_eq!(config.action_channel_capacity, capacity);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            HostConfig::from_yaml_str("action_channel_capacity: 0"),
            Err(HostError::Config(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.yaml");
        std::fs::write(&path, "action_channel_capacity: 16\n").unwrap();
        assert_eq!(HostConfig::load(&path).unwrap().action_channel_capacity, 16);
    }
}
