//! Sequencing of the root lifecycle.
//!
//! - `deploy`: stage an archive, sync it into the live root, fix ownership.
//! - `run`: mount system and user directories, then launch under the root.
//! - `umount` / `teardown`: remove mounts, then (teardown only) the root.
//!
//! Deployment is not transactional. A failed sync can leave the live root
//! partially updated; re-running `deploy` with the same archive converges.

use std::convert::Infallible;
use std::io::Read;
use std::path::{Path, PathBuf};

use sandroot_common::config::SandrootConfig;
use sandroot_common::constants::STAGING_PREFIX;
use sandroot_common::error::{Result, SandrootError};
use sandroot_common::types::LifecycleState;
use sandroot_core::capability::CapabilitySet;
use sandroot_core::command::run_cmd;
use sandroot_core::filesystem::mount::RetryPolicy;
use sandroot_core::filesystem::mounter::{BindSpec, Mounter, UnmountCoverage};
use sandroot_core::filesystem::root;
use sandroot_core::launch::{self, LaunchSpec};
use sandroot_core::ownership::OwnershipSpec;
use sandroot_image::archive;
use sandroot_image::sync::Synchronizer;

use crate::handle::RootHandle;
use crate::release;

/// How a deployment reaches the live root path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeployMode {
    /// Sync into the live root directory in place.
    #[default]
    Rsync,
    /// Sync into a fresh timestamped release and repoint the live root symlink.
    Symlink,
}

/// Everything `run` needs to start a process under a root.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Root directory or symlink to it.
    pub root: PathBuf,
    /// User directories to bind into the root.
    pub binds: Vec<BindSpec>,
    /// Command and arguments; the first element is the program.
    pub command: Vec<String>,
    /// Capabilities to keep; `None` skips the capability drop.
    pub keep_caps: Option<CapabilitySet>,
    /// Identity to switch to before exec.
    pub credentials: Option<OwnershipSpec>,
    /// Copy host files such as `/etc/resolv.conf` into the root first.
    pub copy_files: bool,
}

impl RunRequest {
    /// Creates a request with every capability dropped and host files copied.
    pub fn new(root: impl Into<PathBuf>, command: Vec<String>) -> Self {
        Self {
            root: root.into(),
            binds: Vec::new(),
            command,
            keep_caps: Some(CapabilitySet::default()),
            credentials: None,
            copy_files: true,
        }
    }
}

/// Drives roots through their lifecycle with one configuration.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    config: SandrootConfig,
}

impl Orchestrator {
    /// Creates an orchestrator using `config`.
    #[must_use]
    pub const fn new(config: SandrootConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &SandrootConfig {
        &self.config
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config)
    }

    /// Deploys a tar-gzip `stream` to `live_root`.
    ///
    /// The staging directory is removed on every exit path. After sync the
    /// root directory is owned by `ownership` with the configured mode.
    ///
    /// # Errors
    ///
    /// Fails on the first staging, sync, ownership, or link error. Earlier
    /// steps are not rolled back.
    pub fn deploy<R: Read>(
        &self,
        stream: R,
        live_root: &Path,
        ownership: &OwnershipSpec,
        mode: DeployMode,
    ) -> Result<RootHandle> {
        let mut handle = RootHandle::new(live_root)?;
        let sync = Synchronizer::from_config(&self.config);
        sync.ensure_available()?;
        if mode == DeployMode::Symlink {
            release::ensure_link_slot(handle.path())?;
        }

        let parent = self.config.staging_parent();
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&parent)
            .map_err(|e| SandrootError::io(&parent, e))?;
        tracing::info!(staging = %staging.path().display(), "staging directory created");

        let _ = archive::stage(stream, staging.path(), ownership)?;
        handle.advance(LifecycleState::Staged)?;

        let target = match mode {
            DeployMode::Rsync => handle.path().to_path_buf(),
            DeployMode::Symlink => release::release_path(handle.path())?,
        };
        sync.sync_root(staging.path(), &target, ownership, self.config.root_mode)?;

        let staging_path = staging.path().to_path_buf();
        staging
            .close()
            .map_err(|e| SandrootError::io(&staging_path, e))?;
        handle.advance(LifecycleState::Synced)?;

        if mode == DeployMode::Symlink {
            release::repoint(handle.path(), &target)?;
        }
        handle.set_real_path(target);
        tracing::info!(
            root = %handle.path().display(),
            real = %handle.real_path().display(),
            "deploy complete"
        );
        Ok(handle)
    }

    /// Mounts what the root needs and replaces this process with the command.
    ///
    /// Returns only on failure. Mounts made before a failure stay in place;
    /// `umount` removes them.
    ///
    /// # Errors
    ///
    /// Returns the first resolution, mount, copy, or launch error.
    pub fn run(&self, request: RunRequest) -> Result<Infallible> {
        let mut handle = RootHandle::new(&request.root)?;
        let mut spec = LaunchSpec::new(handle.path(), request.command)?;
        spec.keep_caps = request.keep_caps;
        spec.credentials = request.credentials;

        let real = root::resolve_root(handle.path())?;
        refuse_host_root(&real)?;
        handle.set_real_path(real.clone());

        let mounter = Mounter::new(&real, self.retry_policy());
        mounter.mount_system_dirs(&self.config.system_mounts)?;
        for bind in &request.binds {
            mounter.bind_dir(bind)?;
        }
        handle.advance(LifecycleState::Mounted)?;

        if request.copy_files {
            self.copy_host_files(&mounter)?;
        }

        handle.advance(LifecycleState::Running)?;
        spec.root = real;
        launch::launch_in_root(spec)
    }

    fn copy_host_files(&self, mounter: &Mounter) -> Result<()> {
        for file in &self.config.copy_files {
            if !file.is_file() {
                tracing::debug!(file = %file.display(), "host file missing, not copied");
                continue;
            }
            let dest = mounter.host_path(file)?;
            if let Some(dir) = dest.parent() {
                std::fs::create_dir_all(dir).map_err(|e| SandrootError::io(dir, e))?;
            }
            run_cmd("cp", [Path::new("-p"), file.as_path(), dest.as_path()])?;
        }
        Ok(())
    }

    /// Unmounts everything under the root without removing it.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::NotFound` if the root does not exist, or a
    /// mount error if an unmount exhausts its retries.
    pub fn umount(&self, root_arg: &Path) -> Result<RootHandle> {
        self.unmount_handle(root_arg).map(|(handle, _)| handle)
    }

    fn unmount_handle(&self, root_arg: &Path) -> Result<(RootHandle, UnmountCoverage)> {
        let mut handle = RootHandle::new(root_arg)?;
        let real = root::resolve_root(handle.path())?;
        refuse_host_root(&real)?;
        handle.set_real_path(real);

        handle.advance(LifecycleState::Unmounting)?;
        let coverage = Mounter::new(handle.real_path(), self.retry_policy())
            .with_mount_table(&self.config.mount_table)
            .unmount_root()?;
        tracing::info!(root = %handle.real_path().display(), ?coverage, "root unmounted");
        Ok((handle, coverage))
    }

    /// Unmounts the root and removes it.
    ///
    /// When `root_arg` is a symlink only the link is removed and the
    /// directory it points to stays; otherwise the directory is removed
    /// recursively, which requires the mount table to have been readable.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::NotFound` if the root does not exist, a mount
    /// error if an unmount exhausts its retries, `SandrootError::Config` if
    /// nested mounts could not be ruled out, or an I/O error on removal.
    pub fn teardown(&self, root_arg: &Path) -> Result<RootHandle> {
        let (mut handle, coverage) = self.unmount_handle(root_arg)?;

        if root::is_symlink(handle.path()) {
            std::fs::remove_file(handle.path()).map_err(|e| SandrootError::io(handle.path(), e))?;
            tracing::info!(link = %handle.path().display(), "root symlink removed");
        } else if coverage == UnmountCoverage::RootOnly {
            return Err(SandrootError::Config {
                message: format!(
                    "{} not removed: mount table {} unreadable, bind mounts may remain",
                    handle.real_path().display(),
                    self.config.mount_table.display()
                ),
            });
        } else {
            std::fs::remove_dir_all(handle.real_path())
                .map_err(|e| SandrootError::io(handle.real_path(), e))?;
            tracing::info!(root = %handle.real_path().display(), "root removed");
        }
        handle.advance(LifecycleState::Removed)?;
        Ok(handle)
    }
}

fn refuse_host_root(real: &Path) -> Result<()> {
    let canonical = std::fs::canonicalize(real).map_err(|e| SandrootError::io(real, e))?;
    if canonical == Path::new("/") {
        return Err(SandrootError::Config {
            message: format!("{} resolves to the host root", real.display()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_root_is_refused() {
        let err = Orchestrator::default()
            .teardown(Path::new("/"))
            .expect_err("must refuse");
        assert!(matches!(err, SandrootError::Config { .. }));
        assert!(Path::new("/").is_dir());
    }

    #[test]
    fn teardown_of_missing_root_is_not_found() {
        let err = Orchestrator::default()
            .teardown(Path::new("/nonexistent/sandroot/root"))
            .expect_err("missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn umount_keeps_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("root");
        std::fs::create_dir(&root).expect("mkdir");

        let handle = Orchestrator::default().umount(&root).expect("umount");
        assert_eq!(handle.state(), LifecycleState::Unmounting);
        assert!(root.is_dir());
    }

    #[test]
    fn teardown_refuses_removal_without_mount_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("data")).expect("mkdir");
        std::fs::write(root.join("data/keep"), "x").expect("write");
        let orchestrator = Orchestrator::new(SandrootConfig {
            mount_table: dir.path().join("no-mountinfo"),
            ..SandrootConfig::default()
        });

        let err = orchestrator.teardown(&root).expect_err("must refuse");
        assert!(matches!(err, SandrootError::Config { .. }));
        assert!(root.join("data/keep").is_file());

        let handle = orchestrator.umount(&root).expect("umount still works");
        assert_eq!(handle.state(), LifecycleState::Unmounting);
    }

    #[test]
    fn run_without_command_fails_before_mounting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Orchestrator::default()
            .run(RunRequest::new(dir.path(), Vec::new()))
            .expect_err("no command");
        assert!(matches!(err, SandrootError::Config { .. }));
        assert!(!dir.path().join("proc").exists());
    }

    #[test]
    fn run_with_missing_root_is_not_found() {
        let err = Orchestrator::default()
            .run(RunRequest::new("/nonexistent/sandroot/root", vec!["sh".into()]))
            .expect_err("missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn symlink_mode_refuses_real_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Orchestrator::default()
            .deploy(
                &b""[..],
                dir.path(),
                &OwnershipSpec::current(),
                DeployMode::Symlink,
            )
            .expect_err("must refuse");
        // Without rsync installed the availability check fails first.
        assert!(matches!(
            err,
            SandrootError::Config { .. } | SandrootError::NotFound { .. }
        ));
    }
}
