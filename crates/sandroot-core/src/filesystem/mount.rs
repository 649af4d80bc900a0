//! Mount-point detection, bind mounts, and bounded-retry unmounting.
//!
//! A path is a mount point iff its device identifier differs from the
//! device identifier of its parent directory.

use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::Duration;

use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};
use sandroot_common::config::SandrootConfig;
use sandroot_common::constants;
use sandroot_common::error::{Result, SandrootError};

/// How often and how patiently an unmount is retried.
///
/// Retrying absorbs transient `EBUSY` from file descriptors still held by
/// a process that has just exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub attempts: u32,
    /// Pause between failed attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: constants::UNMOUNT_ATTEMPTS,
            delay: Duration::from_millis(constants::UNMOUNT_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Builds the policy configured in `config`.
    #[must_use]
    pub const fn from_config(config: &SandrootConfig) -> Self {
        Self {
            attempts: config.unmount_attempts,
            delay: config.unmount_delay(),
        }
    }
}

/// Reports whether `path` is a mount point.
///
/// A missing `path` is reported as not mounted.
///
/// # Errors
///
/// Returns an error if `path` exists but it or its parent cannot be
/// inspected (for example, permission denied).
pub fn is_mounted(path: &Path) -> Result<bool> {
    let target = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(SandrootError::io(path, e)),
    };

    let parent_path = path.join("..");
    let parent = std::fs::metadata(&parent_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SandrootError::path_not_found(&parent_path)
        } else {
            SandrootError::io(&parent_path, e)
        }
    })?;

    Ok(target.dev() != parent.dev())
}

/// Creates a bind mount of `source` at `dest`.
///
/// Not idempotent: binding an already-mounted target stacks a second
/// mount. Callers check [`is_mounted`] first when that matters.
///
/// # Errors
///
/// Returns `SandrootError::Mount` if the `mount(2)` syscall fails.
pub fn bind_mount(source: &Path, dest: &Path) -> Result<()> {
    nix::mount::mount(
        Some(source),
        dest,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(|e| SandrootError::Mount {
        operation: "bind mount",
        target: dest.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(source = %source.display(), dest = %dest.display(), "bind mounted");
    Ok(())
}

/// Remounts an existing bind mount at `path` read-only.
///
/// # Errors
///
/// Returns `SandrootError::Mount` if `path` is not a bind mount or the
/// remount fails.
pub fn remount_readonly(path: &Path) -> Result<()> {
    nix::mount::mount(
        None::<&str>,
        path,
        None::<&str>,
        MsFlags::MS_REMOUNT | MsFlags::MS_BIND | MsFlags::MS_RDONLY,
        None::<&str>,
    )
    .map_err(|e| SandrootError::Mount {
        operation: "read-only remount",
        target: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), "remounted read-only");
    Ok(())
}

/// Unmounts `path` if it is a mount point, with the default retry policy.
///
/// Returns immediately, without any syscall, when `path` is not mounted.
///
/// # Errors
///
/// Returns an error if mount detection fails or every attempt fails.
pub fn unmount(path: &Path, flags: MntFlags) -> Result<()> {
    unmount_with(path, flags, RetryPolicy::default())
}

/// Like [`unmount`] with an explicit retry policy.
///
/// # Errors
///
/// Returns an error if mount detection fails or every attempt fails.
pub fn unmount_with(path: &Path, flags: MntFlags, policy: RetryPolicy) -> Result<()> {
    if !is_mounted(path)? {
        tracing::debug!(path = %path.display(), "not mounted, nothing to unmount");
        return Ok(());
    }
    force_unmount_with(path, flags, policy)
}

/// Unmounts `path` without checking whether it is mounted.
///
/// # Errors
///
/// Returns `SandrootError::Mount` with the last errno once every attempt
/// has failed.
pub fn force_unmount(path: &Path, flags: MntFlags) -> Result<()> {
    force_unmount_with(path, flags, RetryPolicy::default())
}

/// Like [`force_unmount`] with an explicit retry policy.
///
/// # Errors
///
/// Returns `SandrootError::Mount` with the last errno once every attempt
/// has failed.
pub fn force_unmount_with(path: &Path, flags: MntFlags, policy: RetryPolicy) -> Result<()> {
    retry_unmount(path, policy, || nix::mount::umount2(path, flags))?;
    tracing::info!(path = %path.display(), "unmounted");
    Ok(())
}

fn retry_unmount<F>(path: &Path, policy: RetryPolicy, mut op: F) -> Result<()>
where
    F: FnMut() -> std::result::Result<(), Errno>,
{
    let mut last = Errno::UnknownErrno;
    for attempt in 1..=policy.attempts.max(1) {
        match op() {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(path = %path.display(), attempt, error = %e, "unmount failed");
                last = e;
            }
        }
        if attempt < policy.attempts {
            std::thread::sleep(policy.delay);
        }
    }
    Err(SandrootError::Mount {
        operation: "unmount",
        target: path.to_path_buf(),
        source: last,
    })
}
