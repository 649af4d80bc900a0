//! Ownership of deployed roots.
//!
//! An [`OwnershipSpec`] names the uid/gid a deployed root directory is
//! handed to. It is resolved from user and group names or ids and
//! defaults to the caller's own identity.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::unistd::{Gid, Group, Uid, User};
use sandroot_common::error::{Result, SandrootError};

/// A (uid, gid) pair applied to a root directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipSpec {
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
}

impl Default for OwnershipSpec {
    fn default() -> Self {
        Self::current()
    }
}

impl OwnershipSpec {
    /// Returns the calling process's real uid and gid.
    #[must_use]
    pub fn current() -> Self {
        Self {
            uid: Uid::current().as_raw(),
            gid: Gid::current().as_raw(),
        }
    }

    /// Resolves optional user and group overrides on top of the caller's identity.
    ///
    /// Each value may be a numeric id or a name from the user/group database.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::NotFound` for unknown names, or
    /// `SandrootError::Config` if the database lookup itself fails.
    pub fn resolve(user: Option<&str>, group: Option<&str>) -> Result<Self> {
        let mut spec = Self::current();
        if let Some(user) = user {
            spec.uid = lookup_user(user)?;
        }
        if let Some(group) = group {
            spec.gid = lookup_group(group)?;
        }
        Ok(spec)
    }

    /// Changes the owner of `path` (not following symlinks) and forces `mode`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `chown` or `chmod` fails.
    pub fn apply(&self, path: &Path, mode: u32) -> Result<()> {
        std::os::unix::fs::lchown(path, Some(self.uid), Some(self.gid))
            .map_err(|e| SandrootError::io(path, e))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| SandrootError::io(path, e))?;
        tracing::debug!(
            path = %path.display(),
            uid = self.uid,
            gid = self.gid,
            mode = %format_args!("{mode:o}"),
            "ownership applied"
        );
        Ok(())
    }
}

/// Resolves a user name or numeric id to a uid.
///
/// # Errors
///
/// Returns `SandrootError::NotFound` if no such user exists.
pub fn lookup_user(user: &str) -> Result<u32> {
    if let Ok(uid) = user.parse::<u32>() {
        return Ok(uid);
    }
    User::from_name(user)
        .map_err(|e| SandrootError::Config {
            message: format!("looking up user {user}: {e}"),
        })?
        .map(|u| u.uid.as_raw())
        .ok_or_else(|| SandrootError::NotFound {
            kind: "user",
            id: user.to_owned(),
        })
}

/// Resolves a group name or numeric id to a gid.
///
/// # Errors
///
/// Returns `SandrootError::NotFound` if no such group exists.
pub fn lookup_group(group: &str) -> Result<u32> {
    if let Ok(gid) = group.parse::<u32>() {
        return Ok(gid);
    }
    Group::from_name(group)
        .map_err(|e| SandrootError::Config {
            message: format!("looking up group {group}: {e}"),
        })?
        .map(|g| g.gid.as_raw())
        .ok_or_else(|| SandrootError::NotFound {
            kind: "group",
            id: group.to_owned(),
        })
}
