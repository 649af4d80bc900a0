//! Live root convergence through the directory sync program.

use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;

use sandroot_common::config::SandrootConfig;
use sandroot_common::error::{Result, SandrootError};
use sandroot_core::command::run_cmd;
use sandroot_core::ownership::OwnershipSpec;

/// Renders `path` as "the contents of" the directory, with exactly one
/// trailing `/`. The path bytes are passed through unchanged.
#[must_use]
pub fn contents_of(path: &Path) -> OsString {
    let mut bytes = path.as_os_str().as_bytes().to_vec();
    while bytes.len() > 1 && bytes.ends_with(b"/") {
        let _ = bytes.pop();
    }
    if !bytes.ends_with(b"/") {
        bytes.push(b'/');
    }
    OsString::from_vec(bytes)
}

/// Runs the sync program with a fixed option set.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    program: String,
    options: Vec<String>,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::from_config(&SandrootConfig::default())
    }
}

impl Synchronizer {
    /// Builds a synchronizer from the configured program and options.
    #[must_use]
    pub fn from_config(config: &SandrootConfig) -> Self {
        Self {
            program: config.rsync_program.clone(),
            options: config.rsync_options.clone(),
        }
    }

    /// Checks that the sync program can be found on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::NotFound` if the program is not installed.
    pub fn ensure_available(&self) -> Result<()> {
        which::which(&self.program)
            .map(|_| ())
            .map_err(|_| SandrootError::NotFound {
                kind: "sync program",
                id: self.program.clone(),
            })
    }

    /// Makes `live` an exact copy of `staging`, deleting extraneous files.
    ///
    /// `live` is created if missing. Re-running against an unchanged
    /// staging directory is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::Sync` if the sync program fails, or an I/O
    /// error if `live` cannot be created.
    pub fn sync(&self, staging: &Path, live: &Path) -> Result<()> {
        std::fs::create_dir_all(live).map_err(|e| SandrootError::io(live, e))?;

        let from = contents_of(staging);
        let to = contents_of(live);
        let args = self
            .options
            .iter()
            .map(OsString::from)
            .chain([from.clone(), to.clone()]);

        tracing::info!(from = %from.to_string_lossy(), to = %to.to_string_lossy(), "syncing root");
        run_cmd(&self.program, args).map_err(|e| SandrootError::Sync {
            from: from.to_string_lossy().into_owned(),
            to: to.to_string_lossy().into_owned(),
            message: e.to_string(),
        })
    }

    /// Syncs `staging` into `live`, then forces `ownership` and `mode` on `live`.
    ///
    /// # Errors
    ///
    /// Returns the first sync or ownership error; `live` may be left
    /// partially updated.
    pub fn sync_root(
        &self,
        staging: &Path,
        live: &Path,
        ownership: &OwnershipSpec,
        mode: u32,
    ) -> Result<()> {
        self.sync(staging, live)?;
        ownership.apply(live, mode)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::ffi::OsStr;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    use super::*;

    fn have_rsync() -> bool {
        Synchronizer::default().ensure_available().is_ok()
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
            for entry in std::fs::read_dir(dir).expect("read_dir") {
                let path = entry.expect("entry").path();
                let rel = path.strip_prefix(root).expect("prefix").to_path_buf();
                if path.is_dir() {
                    let _ = out.insert(rel, Vec::new());
                    walk(root, &path, out);
                } else {
                    let _ = out.insert(rel, std::fs::read(&path).expect("read"));
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(root, root, &mut out);
        out
    }

    fn populate(staging: &Path) {
        std::fs::create_dir_all(staging.join("etc")).expect("mkdir");
        std::fs::create_dir_all(staging.join("bin")).expect("mkdir");
        std::fs::write(staging.join("etc/app.conf"), "port = 80\n").expect("write");
        std::fs::write(staging.join("bin/app"), "#!/bin/sh\n").expect("write");
    }

    #[test]
    fn contents_of_appends_single_separator() {
        assert_eq!(contents_of(Path::new("/tmp/stage")), "/tmp/stage/");
        assert_eq!(contents_of(Path::new("/tmp/stage/")), "/tmp/stage/");
        assert_eq!(contents_of(Path::new("/tmp/stage//")), "/tmp/stage/");
        assert_eq!(contents_of(Path::new("/")), "/");
    }

    #[test]
    fn contents_of_keeps_non_utf8_bytes() {
        let raw = Path::new(OsStr::from_bytes(b"/srv/live\xff"));
        assert_eq!(contents_of(raw).as_bytes(), b"/srv/live\xff/");
    }

    #[test]
    fn non_utf8_paths_reach_the_program_intact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let staging = dir.path().join("stage");
        populate(&staging);
        let live = dir.path().join(OsStr::from_bytes(b"live\xff"));

        // The program only succeeds if both arguments name real directories.
        let config = SandrootConfig {
            rsync_program: "sh".into(),
            rsync_options: vec![
                "-c".into(),
                r#"test -d "$1" && test -d "$2""#.into(),
                "sync-check".into(),
            ],
            ..SandrootConfig::default()
        };
        Synchronizer::from_config(&config)
            .sync(&staging, &live)
            .expect("sync");
        assert!(live.is_dir());
    }

    #[test]
    fn sync_is_convergent() {
        if !have_rsync() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let staging = dir.path().join("stage");
        let live = dir.path().join("live");
        populate(&staging);

        let sync = Synchronizer::default();
        sync.sync(&staging, &live).expect("first sync");
        let first = snapshot(&live);
        sync.sync(&staging, &live).expect("second sync");
        assert_eq!(snapshot(&live), first);
        assert_eq!(first, snapshot(&staging));
    }

    #[test]
    fn trailing_separator_does_not_change_result() {
        if !have_rsync() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let staging = dir.path().join("stage");
        populate(&staging);
        let plain = dir.path().join("plain");
        let slashed = dir.path().join("slashed");

        let sync = Synchronizer::default();
        sync.sync(&staging, &plain).expect("sync plain");
        sync.sync(
            Path::new(&format!("{}/", staging.display())),
            Path::new(&format!("{}/", slashed.display())),
        )
        .expect("sync slashed");
        assert_eq!(snapshot(&plain), snapshot(&slashed));
        assert!(!plain.join("stage").exists());
    }

    #[test]
    fn extraneous_files_are_deleted() {
        if !have_rsync() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let staging = dir.path().join("stage");
        let live = dir.path().join("live");
        populate(&staging);
        std::fs::create_dir_all(live.join("var")).expect("mkdir");
        std::fs::write(live.join("var/stale.log"), "old").expect("write");

        Synchronizer::default().sync(&staging, &live).expect("sync");
        assert!(!live.join("var").exists());
        assert_eq!(snapshot(&live), snapshot(&staging));
    }

    #[test]
    fn sync_root_forces_mode() {
        if !have_rsync() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let staging = dir.path().join("stage");
        let live = dir.path().join("live");
        populate(&staging);
        std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o700)).expect("chmod");

        Synchronizer::default()
            .sync_root(&staging, &live, &OwnershipSpec::current(), 0o755)
            .expect("sync_root");
        let mode = std::fs::metadata(&live).expect("stat").permissions().mode();
        assert_eq!(mode & 0o7777, 0o755);
    }

    #[test]
    fn failing_program_is_a_sync_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SandrootConfig {
            rsync_program: "false".into(),
            ..SandrootConfig::default()
        };
        let err = Synchronizer::from_config(&config)
            .sync(dir.path(), &dir.path().join("live"))
            .expect_err("must fail");
        match err {
            SandrootError::Sync { from, to, .. } => {
                assert!(from.ends_with('/'));
                assert!(to.ends_with("live/"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_not_found() {
        let config = SandrootConfig {
            rsync_program: "sandroot-no-such-rsync".into(),
            ..SandrootConfig::default()
        };
        let err = Synchronizer::from_config(&config)
            .ensure_available()
            .expect_err("missing");
        assert!(err.is_not_found());
    }
}
