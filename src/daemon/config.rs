use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::storage::remote::DEFAULT_REMOTE_QUOTA;

pub const CONFIG_FILE: &str = "config.toml";

/// Service settings read from `config.toml` in the application directory. Every field is
/// optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Quiet period after the last change before history is written.
    pub debounce_ms: u64,
    /// How often captured deltas are handed over to the reconciler.
    pub flush_interval_ms: u64,
    /// Directory replicated between devices. Local only when unset.
    pub remote_dir: Option<PathBuf>,
    pub remote_poll_ms: u64,
    pub remote_quota_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            flush_interval_ms: 100,
            remote_dir: None,
            remote_poll_ms: 2000,
            remote_quota_bytes: DEFAULT_REMOTE_QUOTA,
        }
    }
}

impl Settings {
    /// Reads settings from `dir`. A missing file gives the defaults, a malformed one is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No {CONFIG_FILE} found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        toml::from_str(&raw).with_context(|| format!("Malformed {}", path.display()))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn remote_poll(&self) -> Duration {
        Duration::from_millis(self.remote_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{Settings, CONFIG_FILE};

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let dir = tempdir()?;

        let settings = Settings::load(dir.path())?;

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.debounce(), Duration::from_secs(1));
        assert_eq!(settings.flush_interval(), Duration::from_millis(100));
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "debounce_ms = 250\nremote_dir = \"/mnt/sync\"\n",
        )?;

        let settings = Settings::load(dir.path())?;

        assert_eq!(settings.debounce_ms, 250);
        assert_eq!(settings.remote_dir, Some(PathBuf::from("/mnt/sync")));
        assert_eq!(settings.remote_poll_ms, 2000);
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join(CONFIG_FILE), "debounce_ms = \"soon\"")?;

        assert!(Settings::load(dir.path()).is_err());
        Ok(())
    }
}
