//! Process launch under a new root.
//!
//! The transition is `chroot` → `chdir("/")` → capability drop →
//! optional credential switch → `execve`. Each step is fatal and no
//! later step runs after a failure. On success the calling process image
//! is replaced and nothing returns.

use std::convert::Infallible;
use std::ffi::CString;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid};
use sandroot_common::error::{Result, SandrootError};

use crate::capability::{self, CapabilitySet};
use crate::ownership::OwnershipSpec;

/// Everything needed to replace the current process with a command running
/// under `root`.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Directory that becomes `/`.
    pub root: PathBuf,
    /// Capabilities to keep. `None` leaves the bounding set untouched.
    pub keep_caps: Option<CapabilitySet>,
    /// Program to run, resolved through `PATH` inside the new root.
    pub command: String,
    /// Full argument vector, `argv[0]` included.
    pub args: Vec<String>,
    /// Environment as `KEY=VALUE` strings.
    pub env: Vec<String>,
    /// Identity to switch to after dropping capabilities.
    pub credentials: Option<OwnershipSpec>,
}

impl LaunchSpec {
    /// Creates a spec running `argv` with the caller's environment and
    /// every capability dropped.
    ///
    /// # Errors
    ///
    /// Returns `SandrootError::Config` if `argv` is empty.
    pub fn new(root: impl Into<PathBuf>, argv: Vec<String>) -> Result<Self> {
        let command = argv.first().cloned().ok_or_else(|| SandrootError::Config {
            message: "no command given".into(),
        })?;
        Ok(Self {
            root: root.into(),
            keep_caps: Some(CapabilitySet::default()),
            command,
            args: argv,
            env: std::env::vars().map(|(k, v)| format!("{k}={v}")).collect(),
            credentials: None,
        })
    }
}

/// Replaces the current process with `spec.command` running under `spec.root`.
///
/// Returns only on failure.
///
/// # Errors
///
/// - `SandrootError::Launch` if argument conversion, `chroot`, `chdir`,
///   the credential switch, command lookup, or `execve` fails.
/// - Capability errors from [`capability::drop_capabilities`].
pub fn launch_in_root(spec: LaunchSpec) -> Result<Infallible> {
    let argv = to_cstrings(&spec.args, "arguments")?;
    let envp = to_cstrings(&spec.env, "environment")?;

    tracing::info!(root = %spec.root.display(), command = %spec.command, "entering root");

    nix::unistd::chroot(&spec.root).map_err(|e| launch_error("chroot", e))?;
    nix::unistd::chdir("/").map_err(|e| launch_error("chdir", e))?;

    if let Some(keep) = spec.keep_caps {
        let _ = capability::drop_capabilities(keep)?;
    }

    if let Some(creds) = spec.credentials {
        switch_credentials(creds)?;
    }

    let program = which::which(&spec.command).map_err(|e| launch_error("resolve", e))?;
    let program = path_to_cstring(&program)?;

    tracing::debug!(program = ?program, args = ?spec.args, "exec");
    let err = match nix::unistd::execve(&program, &argv, &envp) {
        Ok(never) => match never {},
        Err(e) => e,
    };
    Err(launch_error("exec", err))
}

fn switch_credentials(creds: OwnershipSpec) -> Result<()> {
    let gid = Gid::from_raw(creds.gid);
    nix::unistd::setgroups(&[gid]).map_err(|e| launch_error("setgroups", e))?;
    nix::unistd::setgid(gid).map_err(|e| launch_error("setgid", e))?;
    nix::unistd::setuid(Uid::from_raw(creds.uid)).map_err(|e| launch_error("setuid", e))?;
    tracing::debug!(uid = creds.uid, gid = creds.gid, "credentials switched");
    Ok(())
}

fn to_cstrings(values: &[String], what: &str) -> Result<Vec<CString>> {
    values
        .iter()
        .map(|v| {
            CString::new(v.as_bytes()).map_err(|_| SandrootError::Launch {
                step: "prepare",
                message: format!("{what} contain a NUL byte: {v:?}"),
            })
        })
        .collect()
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes()).map_err(|_| SandrootError::Launch {
        step: "resolve",
        message: format!("program path contains a NUL byte: {}", path.display()),
    })
}

fn launch_error(step: &'static str, err: impl std::fmt::Display) -> SandrootError {
    SandrootError::Launch {
        step,
        message: err.to_string(),
    }
}
