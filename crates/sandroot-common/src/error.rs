//! Unified error types for the sandroot workspace.
//!
//! Every lifecycle component reports a typed failure instead of recovering
//! locally. The only internal recoveries are the bounded unmount retry and
//! skipping capability bits the running kernel does not support.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum SandrootError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required path or named resource does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The caller lacks the privilege needed for the operation.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// A mount, remount, or unmount syscall failed (after retries, for unmount).
    #[error("{operation} failed on {target}: {source}")]
    Mount {
        /// Mount operation that failed.
        operation: &'static str,
        /// Target of the mount operation.
        target: PathBuf,
        /// Errno returned by the last attempt.
        source: Errno,
    },

    /// The capability probing loop never evaluated a single index.
    #[error("failed to drop capabilities: {message}")]
    CapabilityDropFailed {
        /// Description of the probing failure.
        message: String,
    },

    /// Reading the image stream from its source failed.
    #[error("transfer from {locator} failed: {message}")]
    Transfer {
        /// Locator of the image source.
        locator: String,
        /// Description of the transfer failure.
        message: String,
    },

    /// The compressed archive could not be extracted.
    #[error("extraction into {target} failed: {source}")]
    Extraction {
        /// Staging directory being extracted into.
        target: PathBuf,
        /// Underlying archive error.
        source: std::io::Error,
    },

    /// The directory sync utility failed.
    #[error("sync from {from} to {to} failed: {message}")]
    Sync {
        /// Normalized source directory.
        from: String,
        /// Normalized destination directory.
        to: String,
        /// Exit status and output of the sync utility.
        message: String,
    },

    /// A step before the process image replacement failed.
    #[error("launch failed during {step}: {message}")]
    Launch {
        /// Launcher step that failed.
        step: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// An external command exited unsuccessfully.
    #[error("command `{program}` failed ({status}): {output}")]
    Command {
        /// Program that was executed.
        program: String,
        /// Exit status description.
        status: String,
        /// Combined stdout and stderr of the command.
        output: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl SandrootError {
    /// Builds an [`SandrootError::Io`] for the given path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Builds a [`SandrootError::NotFound`] for a filesystem path.
    pub fn path_not_found(path: impl AsRef<Path>) -> Self {
        Self::NotFound {
            kind: "path",
            id: path.as_ref().display().to_string(),
        }
    }

    /// Returns whether this error reports a missing resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SandrootError>;
