//! Per-invocation handle on a target root.

use std::path::{Path, PathBuf};

use sandroot_common::error::{Result, SandrootError};
use sandroot_common::types::LifecycleState;

/// Identifies the root an invocation works on and tracks its lifecycle.
///
/// Owned by the orchestrator for one invocation; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootHandle {
    path: PathBuf,
    real_path: PathBuf,
    state: LifecycleState,
}

impl RootHandle {
    /// Creates an unresolved handle for a user-supplied path.
    ///
    /// Relative paths are made absolute against the working directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the working directory cannot be read.
    pub fn new(path: &Path) -> Result<Self> {
        let path = std::path::absolute(path).map_err(|e| SandrootError::io(path, e))?;
        Ok(Self {
            real_path: path.clone(),
            path,
            state: LifecycleState::Unresolved,
        })
    }

    /// Path as given by the user, made absolute.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Real root directory after symlink indirection.
    #[must_use]
    pub fn real_path(&self) -> &Path {
        &self.real_path
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Records the real root directory.
    pub fn set_real_path(&mut self, real: PathBuf) {
        self.real_path = real;
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::Config` if the step is not a legal transition.
    pub fn advance(&mut self, next: LifecycleState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SandrootError::Config {
                message: format!(
                    "root {} cannot move from {} to {next}",
                    self.path.display(),
                    self.state
                ),
            });
        }
        tracing::debug!(root = %self.path.display(), from = %self.state, to = %next, "lifecycle");
        self.state = next;
        Ok(())
    }
}
