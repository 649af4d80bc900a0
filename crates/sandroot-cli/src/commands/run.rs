//! `sroot run`: Run a command chrooted into a root.

use std::path::PathBuf;

use clap::Args;
use sandroot_common::config::SandrootConfig;
use sandroot_core::capability::CapabilitySet;
use sandroot_core::filesystem::mounter::BindSpec;
use sandroot_core::ownership::OwnershipSpec;
use sandroot_runtime::orchestrator::{Orchestrator, RunRequest};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Root directory, or a symlink to it.
    #[arg(long)]
    pub root: PathBuf,

    /// Bind-mount a host directory: `HOST[:CONTAINER]`.
    #[arg(long)]
    pub bind: Vec<String>,

    /// Bind-mount a host directory read-only: `HOST[:CONTAINER]`.
    #[arg(long)]
    pub robind: Vec<String>,

    /// Capability to keep, by name or number. Repeatable.
    #[arg(long)]
    pub keep_cap: Vec<String>,

    /// User to run as, by name or uid.
    #[arg(long)]
    pub user: Option<String>,

    /// Group to run as, by name or gid.
    #[arg(long)]
    pub group: Option<String>,

    /// Keep the full capability bounding set.
    #[arg(long, conflicts_with = "keep_cap")]
    pub no_dropcaps: bool,

    /// Do not copy host files such as `/etc/resolv.conf` into the root.
    #[arg(long)]
    pub no_copy_files: bool,

    /// Command and arguments, after `--`.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `run` command. Only returns on failure.
///
/// # Errors
///
/// Returns an error if argument parsing, mounting, or the launch fails.
pub fn execute(args: RunArgs, config: SandrootConfig) -> anyhow::Result<()> {
    let mut binds = Vec::with_capacity(args.bind.len() + args.robind.len());
    for spec in &args.bind {
        binds.push(BindSpec::parse(spec, false)?);
    }
    for spec in &args.robind {
        binds.push(BindSpec::parse(spec, true)?);
    }

    let keep_caps = if args.no_dropcaps {
        None
    } else {
        Some(CapabilitySet::from_names(&args.keep_cap)?)
    };

    let credentials = if args.user.is_some() || args.group.is_some() {
        Some(OwnershipSpec::resolve(args.user.as_deref(), args.group.as_deref())?)
    } else {
        None
    };

    let request = RunRequest {
        binds,
        keep_caps,
        credentials,
        copy_files: !args.no_copy_files,
        ..RunRequest::new(args.root, args.command)
    };
    match Orchestrator::new(config).run(request)? {}
}
