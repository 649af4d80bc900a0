//! Global configuration model for sandroot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, SandrootError};

/// Root configuration for sandroot.
///
/// Every field has a default, so a configuration file only needs the
/// keys it wants to override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandrootConfig {
    /// Parent directory for temporary staging directories.
    /// `None` uses the system temporary directory.
    pub staging_dir: Option<PathBuf>,
    /// Directory sync program.
    pub rsync_program: String,
    /// Options passed to the sync program before the source and destination.
    pub rsync_options: Vec<String>,
    /// Mode forced onto the deployed root directory.
    pub root_mode: u32,
    /// Number of unmount attempts before giving up.
    pub unmount_attempts: u32,
    /// Delay between unmount attempts, in milliseconds.
    pub unmount_delay_ms: u64,
    /// Host directories bind-mounted into the root before launching.
    pub system_mounts: Vec<PathBuf>,
    /// Host files copied into the root before launching.
    pub copy_files: Vec<PathBuf>,
    /// Mount table consulted when tearing a root down.
    pub mount_table: PathBuf,
}

impl Default for SandrootConfig {
    fn default() -> Self {
        Self {
            staging_dir: None,
            rsync_program: constants::RSYNC_PROGRAM.to_owned(),
            rsync_options: constants::RSYNC_DEFAULT_OPTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            root_mode: constants::ROOT_DIR_MODE,
            unmount_attempts: constants::UNMOUNT_ATTEMPTS,
            unmount_delay_ms: constants::UNMOUNT_DELAY_MS,
            system_mounts: constants::SYSTEM_MOUNTS.iter().map(PathBuf::from).collect(),
            copy_files: constants::COPY_FILES.iter().map(PathBuf::from).collect(),
            mount_table: PathBuf::from(constants::MOUNTINFO_PATH),
        }
    }
}

impl SandrootConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// holds values that fail validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SandrootError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that values are usable.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.unmount_attempts == 0 {
            return Err(SandrootError::Config {
                message: "unmount_attempts must be at least 1".into(),
            });
        }
        if self.root_mode > 0o7777 {
            return Err(SandrootError::Config {
                message: format!("root_mode {:o} is not a permission mode", self.root_mode),
            });
        }
        if self.rsync_program.trim().is_empty() {
            return Err(SandrootError::Config {
                message: "rsync_program is empty".into(),
            });
        }
        Ok(())
    }

    /// Returns the parent directory for staging directories.
    #[must_use]
    pub fn staging_parent(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Returns the delay between unmount attempts.
    #[must_use]
    pub const fn unmount_delay(&self) -> Duration {
        Duration::from_millis(self.unmount_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = SandrootConfig::default();
        assert_eq!(cfg.unmount_attempts, 10);
        assert_eq!(cfg.unmount_delay(), Duration::from_millis(100));
        assert_eq!(cfg.root_mode, 0o755);
        assert_eq!(cfg.rsync_options, vec!["-a", "--delete"]);
        assert_eq!(cfg.mount_table, PathBuf::from("/proc/self/mountinfo"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sandroot.json");
        std::fs::write(&path, r#"{ "root_mode": 448, "unmount_attempts": 3 }"#).expect("write");

        let cfg = SandrootConfig::load(&path).expect("load");
        assert_eq!(cfg.root_mode, 0o700);
        assert_eq!(cfg.unmount_attempts, 3);
        assert_eq!(cfg.rsync_program, "rsync");
        assert_eq!(cfg.system_mounts.len(), 4);
    }

    #[test]
    fn load_rejects_zero_attempts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "unmount_attempts": 0 }"#).expect("write");

        let err = SandrootConfig::load(&path).expect_err("should fail");
        assert!(matches!(err, SandrootError::Config { .. }));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = SandrootConfig::load(Path::new("/nonexistent/sandroot.json"))
            .expect_err("should fail");
        assert!(matches!(err, SandrootError::Io { .. }));
    }

    #[test]
    fn load_malformed_json_is_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").expect("write");

        let err = SandrootConfig::load(&path).expect_err("should fail");
        assert!(matches!(err, SandrootError::Serialization { .. }));
    }

    #[test]
    fn staging_parent_defaults_to_temp_dir() {
        let cfg = SandrootConfig::default();
        assert_eq!(cfg.staging_parent(), std::env::temp_dir());
    }
}
