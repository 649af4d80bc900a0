//! Domain primitive types used across the sandroot workspace.

use std::fmt;

/// Lifecycle state of a root directory within one invocation.
///
/// A deployment walks `Unresolved → Staged → Synced`; a launch walks
/// `Unresolved → Mounted → Running`; teardown enters `Unmounting` from
/// `Unresolved`, `Mounted` or `Running` and ends in `Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// The user-supplied path has not been resolved yet.
    Unresolved,
    /// The archive is extracted into a staging directory.
    Staged,
    /// Staged content is merged into the live root and staging is gone.
    Synced,
    /// System and user directories are bind-mounted into the root.
    Mounted,
    /// The target process is being launched under the root.
    Running,
    /// Mounts under the root are being removed.
    Unmounting,
    /// The root (or its symlink indirection) has been removed.
    Removed,
}

impl LifecycleState {
    /// Returns whether moving from `self` to `next` is a legal step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unresolved, Self::Staged | Self::Mounted | Self::Unmounting)
                | (Self::Staged, Self::Synced)
                | (Self::Synced, Self::Mounted)
                | (Self::Mounted, Self::Running | Self::Unmounting)
                | (Self::Running, Self::Unmounting)
                | (Self::Unmounting, Self::Removed)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => write!(f, "unresolved"),
            Self::Staged => write!(f, "staged"),
            Self::Synced => write!(f, "synced"),
            Self::Mounted => write!(f, "mounted"),
            Self::Running => write!(f, "running"),
            Self::Unmounting => write!(f, "unmounting"),
            Self::Removed => write!(f, "removed"),
        }
    }
}
