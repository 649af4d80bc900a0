//! Timestamped release directories behind a symlink.
//!
//! In symlink mode the live root path is a symlink to the active release
//! `<live>.<YYYYmmddHHMMSS>`. Switching releases replaces the link with a
//! single `rename(2)`, so readers always see either the old or the new tree.

use std::path::{Path, PathBuf};

use chrono::Local;
use sandroot_common::constants::RELEASE_TIMESTAMP_FORMAT;
use sandroot_common::error::{Result, SandrootError};
use sandroot_core::filesystem::{mount, root};

/// Returns the release directory for a deployment started now.
///
/// # Errors
///
/// Returns `SandrootError::Config` if `live` has no file name.
pub fn release_path(live: &Path) -> Result<PathBuf> {
    let name = live.file_name().ok_or_else(|| SandrootError::Config {
        message: format!("{} cannot be used as a release link", live.display()),
    })?;
    let stamp = Local::now().format(RELEASE_TIMESTAMP_FORMAT);
    let mut release = name.to_os_string();
    release.push(format!(".{stamp}"));
    Ok(live.with_file_name(release))
}

/// Checks that `live` is absent or already a symlink.
///
/// # Errors
///
/// Returns `SandrootError::Config` if `live` is a real directory or file.
pub fn ensure_link_slot(live: &Path) -> Result<()> {
    if std::fs::symlink_metadata(live).is_ok() && !root::is_symlink(live) {
        return Err(SandrootError::Config {
            message: format!(
                "{} exists and is not a symlink; symlink mode needs a link or nothing there",
                live.display()
            ),
        });
    }
    Ok(())
}

/// Atomically points the symlink `live` at `release`.
///
/// The release it pointed at before is removed unless it is still a mount
/// point, in which case it is left in place.
///
/// # Errors
///
/// Returns an I/O error if the temporary link cannot be created or renamed.
pub fn repoint(live: &Path, release: &Path) -> Result<()> {
    let previous = if root::is_symlink(live) {
        Some(root::resolve_root(live)?)
    } else {
        None
    };

    let mut tmp_name = live.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".link-{}", std::process::id()));
    let tmp = live.with_file_name(tmp_name);
    if root::is_symlink(&tmp) {
        std::fs::remove_file(&tmp).map_err(|e| SandrootError::io(&tmp, e))?;
    }
    std::os::unix::fs::symlink(release, &tmp).map_err(|e| SandrootError::io(&tmp, e))?;
    std::fs::rename(&tmp, live).map_err(|e| SandrootError::io(live, e))?;
    tracing::info!(link = %live.display(), release = %release.display(), "release activated");

    if let Some(old) = previous.filter(|old| old.as_path() != release) {
        retire(&old);
    }
    Ok(())
}

fn retire(old: &Path) {
    match mount::is_mounted(old) {
        Ok(false) => match std::fs::remove_dir_all(old) {
            Ok(()) => tracing::info!(release = %old.display(), "previous release removed"),
            Err(e) => {
                tracing::warn!(release = %old.display(), error = %e, "could not remove previous release");
            }
        },
        Ok(true) => {
            tracing::warn!(release = %old.display(), "previous release still mounted, left in place");
        }
        Err(e) => {
            tracing::warn!(release = %old.display(), error = %e, "could not inspect previous release");
        }
    }
}
