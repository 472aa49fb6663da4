//! Run options surface
//!
//! The engine consumes these knobs; loading and layering of the actual
//! cloud/provider/profile files is the configuration layer's concern.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_timeout() -> u64 {
    5
}

fn default_keysize() -> usize {
    2048
}

fn default_pki_dir() -> PathBuf {
    PathBuf::from("/etc/salt/pki/master")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Provision map entries through the worker pool
    pub parallel: bool,

    /// Worker pool bound; `None` lets each call site pick its default
    pub pool_size: Option<usize>,

    /// Command to run on newly created minions, grouped by level
    pub start_action: Option<String>,

    /// Destroy live instances absent from the map
    pub hard: bool,

    /// Explicit opt-in required before `hard` is honored
    pub enable_hard_maps: bool,

    /// Post-creation action timeout, in minutes
    #[serde(rename = "timeout")]
    pub timeout_minutes: u64,

    /// Reuse the previous inventory snapshot for this query kind
    pub cached: bool,

    /// Master key directory (minion key preseeding and destroy cleanup)
    pub pki_dir: PathBuf,

    /// Key length for generated keypairs, in bits
    pub keysize: usize,

    /// Main cloud config defaults, lowest layer of the merge chain
    pub defaults: serde_json::Map<String, serde_json::Value>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            pool_size: None,
            start_action: None,
            hard: false,
            enable_hard_maps: false,
            timeout_minutes: default_timeout(),
            cached: false,
            pki_dir: default_pki_dir(),
            keysize: default_keysize(),
            defaults: serde_json::Map::new(),
        }
    }
}

impl RunOptions {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_minutes * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_safe() {
        let opts = RunOptions::default();
        assert!(!opts.parallel);
        assert!(!opts.hard);
        assert!(!opts.enable_hard_maps);
        assert_eq!(opts.timeout_minutes, 5);
        assert_eq!(opts.keysize, 2048);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "parallel: true\npool_size: 4\nstart_action: state.highstate\ntimeout: 10\n"
        )
        .unwrap();
        let opts = RunOptions::from_yaml_file(file.path()).unwrap();
        assert!(opts.parallel);
        assert_eq!(opts.pool_size, Some(4));
        assert_eq!(opts.start_action.as_deref(), Some("state.highstate"));
        assert_eq!(opts.timeout(), std::time::Duration::from_secs(600));
    }
}
