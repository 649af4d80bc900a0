//! Symlink-aware root resolution.
//!
//! A deployed root may be reached through a symlink that points at the
//! currently active release directory. Resolution follows exactly one
//! level of that indirection.

use std::path::{Path, PathBuf};

use sandroot_common::error::{Result, SandrootError};

/// Returns whether `path` itself is a symbolic link.
#[must_use]
pub fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

/// Resolves a user-supplied root path to the real root directory.
///
/// If `path` is a symlink, its target is returned; a relative target is
/// interpreted against the directory holding the link. Otherwise `path`
/// is returned unchanged.
///
/// # Errors
///
/// Returns `SandrootError::NotFound` if `path` does not exist, or an I/O
/// error if it cannot be inspected.
pub fn resolve_root(path: &Path) -> Result<PathBuf> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SandrootError::path_not_found(path)
        } else {
            SandrootError::io(path, e)
        }
    })?;

    if !meta.file_type().is_symlink() {
        return Ok(path.to_path_buf());
    }

    let target = std::fs::read_link(path).map_err(|e| SandrootError::io(path, e))?;
    let resolved = if target.is_absolute() {
        target
    } else {
        path.parent().unwrap_or_else(|| Path::new("/")).join(target)
    };
    tracing::debug!(link = %path.display(), target = %resolved.display(), "resolved root symlink");
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_directory_resolves_to_itself() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolved = resolve_root(dir.path()).expect("resolve");
        assert_eq!(resolved, dir.path());
        assert!(!is_symlink(dir.path()));
    }

    #[test]
    fn symlink_resolves_to_absolute_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real = dir.path().join("real-root");
        let link = dir.path().join("app");
        std::fs::create_dir(&real).expect("mkdir");
        std::os::unix::fs::symlink(&real, &link).expect("symlink");

        assert!(is_symlink(&link));
        assert_eq!(resolve_root(&link).expect("resolve"), real);
    }

    #[test]
    fn relative_symlink_resolves_against_link_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("app.20240101000000")).expect("mkdir");
        let link = dir.path().join("app");
        std::os::unix::fs::symlink("app.20240101000000", &link).expect("symlink");

        assert_eq!(
            resolve_root(&link).expect("resolve"),
            dir.path().join("app.20240101000000")
        );
    }

    #[test]
    fn missing_path_is_not_found() {
        let err = resolve_root(Path::new("/nonexistent/sandroot/root")).expect_err("missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn dangling_symlink_still_resolves() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = dir.path().join("dangling");
        std::os::unix::fs::symlink("/nonexistent/target", &link).expect("symlink");
        assert_eq!(
            resolve_root(&link).expect("resolve"),
            PathBuf::from("/nonexistent/target")
        );
    }
}
