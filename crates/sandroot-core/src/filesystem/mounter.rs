//! Mounts a root needs while a process runs inside it.
//!
//! Host system directories (`/proc`, `/sys`, `/dev`, ...) and user
//! directories are bind-mounted under the root before launch. Teardown
//! walks the mount table and removes everything below the root,
//! deepest mount first.

use std::path::{Component, Path, PathBuf};

use nix::mount::MntFlags;
use sandroot_common::constants;
use sandroot_common::error::{Result, SandrootError};

use super::mount::{self, RetryPolicy};

/// A host directory to expose inside the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpec {
    /// Directory on the host.
    pub host: PathBuf,
    /// Absolute path as seen from inside the root.
    pub target: PathBuf,
    /// Remount read-only after binding.
    pub readonly: bool,
}

impl BindSpec {
    /// Parses `HOST[:CONTAINER]`. Without `CONTAINER`, the host path is
    /// reused inside the root.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::Config` if either path is empty or relative.
    pub fn parse(spec: &str, readonly: bool) -> Result<Self> {
        let (host, target) = spec.split_once(':').unwrap_or((spec, spec));
        for part in [host, target] {
            if part.is_empty() || !part.starts_with('/') {
                return Err(SandrootError::Config {
                    message: format!("bind spec {spec:?} needs absolute paths"),
                });
            }
        }
        Ok(Self {
            host: PathBuf::from(host),
            target: PathBuf::from(target),
            readonly,
        })
    }
}

/// How much of a root `Mounter::unmount_root` was able to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountCoverage {
    /// The mount table was read; nothing below the root is mounted.
    Complete,
    /// The mount table was unreadable; only the root itself was handled
    /// and mounts below it may remain.
    RootOnly,
}

/// Mount operations scoped to one root directory.
#[derive(Debug, Clone)]
pub struct Mounter {
    root: PathBuf,
    policy: RetryPolicy,
    mount_table: PathBuf,
}

impl Mounter {
    /// Creates a mounter for the resolved root directory.
    pub fn new(root: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
            mount_table: PathBuf::from(constants::MOUNTINFO_PATH),
        }
    }

    /// Reads mount points from `path` instead of the process mount table.
    #[must_use]
    pub fn with_mount_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_table = path.into();
        self
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an absolute in-root path to its location on the host.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::Config` if the path escapes the root via `..`.
    pub fn host_path(&self, inner: &Path) -> Result<PathBuf> {
        let mut out = self.root.clone();
        for component in inner.components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(part) => out.push(part),
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(SandrootError::Config {
                        message: format!("{} escapes the root", inner.display()),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Bind-mounts each host system directory at the same path inside the root.
    ///
    /// Missing host directories are skipped, as are targets that are
    /// already mount points.
    ///
    /// # Errors
    ///
    /// Returns an error if a target cannot be created or a bind fails.
    pub fn mount_system_dirs(&self, dirs: &[PathBuf]) -> Result<()> {
        for host in dirs {
            if !host.is_dir() {
                tracing::debug!(dir = %host.display(), "host directory missing, skipping");
                continue;
            }
            let target = self.host_path(host)?;
            std::fs::create_dir_all(&target).map_err(|e| SandrootError::io(&target, e))?;
            if mount::is_mounted(&target)? {
                tracing::debug!(target = %target.display(), "already mounted");
                continue;
            }
            mount::bind_mount(host, &target)?;
        }
        tracing::info!(root = %self.root.display(), count = dirs.len(), "system directories mounted");
        Ok(())
    }

    /// Bind-mounts a host directory into the root, read-only if requested.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::NotFound` if the host directory is missing,
    /// or a mount error if binding or remounting fails.
    pub fn bind_dir(&self, spec: &BindSpec) -> Result<()> {
        if !spec.host.is_dir() {
            return Err(SandrootError::NotFound {
                kind: "bind source",
                id: spec.host.display().to_string(),
            });
        }
        let target = self.host_path(&spec.target)?;
        std::fs::create_dir_all(&target).map_err(|e| SandrootError::io(&target, e))?;
        mount::bind_mount(&spec.host, &target)?;
        if spec.readonly {
            mount::remount_readonly(&target)?;
        }
        tracing::info!(
            host = %spec.host.display(),
            target = %target.display(),
            readonly = spec.readonly,
            "bind mounted"
        );
        Ok(())
    }

    /// Unmounts every mount located under the root, then the root itself.
    ///
    /// Mount points listed in the mount table are removed unconditionally
    /// (deepest first). When the table is unavailable, only the root is
    /// considered, using device-identifier detection, and the result is
    /// `UnmountCoverage::RootOnly`.
    ///
    /// # Errors
    ///
    /// Returns a mount error if any unmount exhausts its retries.
    pub fn unmount_root(&self) -> Result<UnmountCoverage> {
        let real = std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let table = match std::fs::read_to_string(&self.mount_table) {
            Ok(content) => parse_mountinfo(&content),
            Err(e) => {
                tracing::warn!(
                    table = %self.mount_table.display(),
                    error = %e,
                    "mount table unavailable, nested mounts not checked"
                );
                mount::unmount_with(&self.root, MntFlags::empty(), self.policy)?;
                return Ok(UnmountCoverage::RootOnly);
            }
        };

        for target in mounts_under(&real, &table) {
            mount::force_unmount_with(&target, MntFlags::empty(), self.policy)?;
        }

        if table.iter().any(|m| *m == real) {
            mount::force_unmount_with(&real, MntFlags::empty(), self.policy)?;
        } else {
            mount::unmount_with(&real, MntFlags::empty(), self.policy)?;
        }
        Ok(UnmountCoverage::Complete)
    }
}

/// Extracts mount points from `/proc/self/mountinfo` content.
#[must_use]
pub fn parse_mountinfo(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(unescape_mount_path)
        .collect()
}

/// Returns mount points strictly below `root`, deepest first.
#[must_use]
pub fn mounts_under(root: &Path, table: &[PathBuf]) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = table
        .iter()
        .filter(|m| m.as_path() != root && m.starts_with(root))
        .cloned()
        .collect();
    found.sort_by_key(|m| std::cmp::Reverse(m.components().count()));
    found
}

/// Decodes the octal escapes (`\040` for space, ...) the kernel uses in
/// mount table paths.
fn unescape_mount_path(raw: &str) -> PathBuf {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..=i + 3].iter().all(|b| (b'0'..=b'7').contains(b));
        if escaped {
            let value = bytes[i + 1..=i + 3]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTINFO: &str = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
23 22 0:21 / /proc rw,nosuid shared:12 - proc proc rw
40 22 0:5 / /srv/app/proc rw - proc proc rw
41 22 0:6 / /srv/app/dev rw - devtmpfs udev rw
42 41 0:7 / /srv/app/dev/pts rw - devpts devpts rw
43 22 8:1 /data /srv/app/mnt/my\\040data ro - ext4 /dev/sda1 rw
44 22 8:1 / /srv/app2/proc rw - proc proc rw
";

    #[test]
    fn parse_mountinfo_reads_mount_points() {
        let table = parse_mountinfo(MOUNTINFO);
        assert_eq!(table.len(), 7);
        assert_eq!(table[1], PathBuf::from("/proc"));
        assert_eq!(table[5], PathBuf::from("/srv/app/mnt/my data"));
    }

    #[test]
    fn mounts_under_orders_deepest_first_and_skips_siblings() {
        let table = parse_mountinfo(MOUNTINFO);
        let found = mounts_under(Path::new("/srv/app"), &table);
        assert_eq!(found.len(), 4);
        assert_eq!(found[0].components().count(), 5);
        assert!(found.iter().all(|m| m.starts_with("/srv/app")));
        assert!(!found.contains(&PathBuf::from("/srv/app2/proc")));
        let pts = found.iter().position(|m| m.ends_with("dev/pts")).expect("pts");
        let dev = found.iter().position(|m| m.ends_with("app/dev")).expect("dev");
        assert!(pts < dev);
    }

    #[test]
    fn unescape_leaves_plain_paths_alone() {
        assert_eq!(unescape_mount_path("/a/b"), PathBuf::from("/a/b"));
        assert_eq!(unescape_mount_path("/a\\134b"), PathBuf::from("/a\\b"));
        assert_eq!(unescape_mount_path("/trailing\\"), PathBuf::from("/trailing\\"));
    }

    #[test]
    fn bind_spec_defaults_target_to_host() {
        let spec = BindSpec::parse("/var/data", false).expect("parse");
        assert_eq!(spec.host, PathBuf::from("/var/data"));
        assert_eq!(spec.target, PathBuf::from("/var/data"));
        assert!(!spec.readonly);
    }

    #[test]
    fn bind_spec_with_container_path() {
        let spec = BindSpec::parse("/var/data:/data", true).expect("parse");
        assert_eq!(spec.target, PathBuf::from("/data"));
        assert!(spec.readonly);
    }

    #[test]
    fn bind_spec_rejects_relative_paths() {
        assert!(BindSpec::parse("data:/data", false).is_err());
        assert!(BindSpec::parse("/data:", false).is_err());
    }

    #[test]
    fn host_path_stays_inside_root() {
        let m = Mounter::new("/srv/app", RetryPolicy::default());
        assert_eq!(
            m.host_path(Path::new("/dev/pts")).expect("path"),
            PathBuf::from("/srv/app/dev/pts")
        );
        assert!(m.host_path(Path::new("/../etc")).is_err());
    }

    #[test]
    fn bind_dir_with_missing_host_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = Mounter::new(dir.path(), RetryPolicy::default());
        let spec = BindSpec::parse("/nonexistent/sandroot/bind", false).expect("parse");
        assert!(m.bind_dir(&spec).expect_err("missing").is_not_found());
    }

    #[test]
    fn unmount_root_on_plain_directory_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = Mounter::new(dir.path(), RetryPolicy::default());
        assert_eq!(m.unmount_root().expect("nothing to unmount"), UnmountCoverage::Complete);
    }

    #[test]
    fn unreadable_mount_table_reports_root_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let m = Mounter::new(dir.path(), RetryPolicy::default())
            .with_mount_table(dir.path().join("no-mountinfo"));
        assert_eq!(m.unmount_root().expect("root only"), UnmountCoverage::RootOnly);
        assert!(dir.path().is_dir());
    }

    #[test]
    fn supplied_mount_table_is_used() {
        let dir = tempfile::tempdir().expect("tempdir");
        let table = dir.path().join("mountinfo");
        std::fs::write(&table, MOUNTINFO).expect("write");
        let m = Mounter::new(dir.path(), RetryPolicy::default()).with_mount_table(&table);
        assert_eq!(m.unmount_root().expect("complete"), UnmountCoverage::Complete);
    }
}
